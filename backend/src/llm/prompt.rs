//! Underwriting prompt sent to the completion provider.

use crate::models::AnalysisType;

pub const SYSTEM_PROMPT: &str = "You are a senior United States residential real estate analyst \
with two decades of underwriting experience. You produce accurate, structured and actionable \
reports for investors and always follow the phases and output format given in the request.";

/// Extra instruction appended for the deeper analysis types.
fn emphasis(analysis_type: AnalysisType) -> Option<&'static str> {
    match analysis_type {
        AnalysisType::Standard => None,
        AnalysisType::Detailed => Some(
            "Go deeper than usual on comparable sales and repair scope: list every comp you \
             used with its condition and price per square foot.",
        ),
        AnalysisType::Investment => Some(
            "Focus on investment returns: expand the rental, cash buyer and offer sections and \
             state the expected cash-on-cash return.",
        ),
    }
}

/// Build the user prompt for one property.
///
/// Notes are optional; without them the model is told to assume a light rehab.
pub fn build_prompt(address: &str, notes: Option<&str>, analysis_type: AnalysisType) -> String {
    let notes = notes.map(str::trim).filter(|n| !n.is_empty());
    let notes_line = notes.unwrap_or("No acquisition notes were provided.");
    let rehab_default = if notes.is_none() {
        "\n   * No notes were given, so assume a Light rehab."
    } else {
        ""
    };

    let mut prompt = format!(
        "Analyze the property below as an experienced underwriter. Base every figure on verified \
data, ignore the seller's asking price, and keep the answer concise and structured.

Property address: {address}

Phase 1 - Property facts and value
1. Confirm beds, baths, living area, lot size, year built and property type, cross-checking \
the major listing portals.
2. After-repair value (ARV): use 3 to 5 sold comparables from the last 6 months (12 if \
necessary) within 500 sq ft, 5 years of construction and 0.25 acres of the subject, same type \
and similar exterior. ARV = average price per sq ft x subject sq ft, excluding outliers and \
unverified sales.
3. As-is value from distressed or investor-grade sales in the last 12 months, never above ARV.

Phase 2 - Local economy: five-year job growth, population trend, unemployment, infrastructure \
projects.

Phase 3 - Rental market: monthly rent as-is and after repairs, demand score (1-10), \
rent-to-price ratio and cash flow, short-term rental potential and rules.

Phase 4 - Buying percentage
1. Base percentage from the share of pending listings: under 15% -> 66%, 15-24% -> 68%, \
25-34% -> 70%, 35-44% -> 73%, 45% and above -> 75%.
2. Subtract 5-10% for poorly rated schools (1-2); add 3-5% for strong buyer demand.
3. Cap at 75% unless pre-approved.

Phase 5 - Crime and safety: rating (1-10), safety level (low, medium, high), main crime types, \
comparison with city, county and state.

Phase 6 - Schools: elementary, middle and high school ratings (1-10), nearby colleges, \
graduation rates, test scores and student-teacher ratios.

Phase 7 - Cash buyer activity: flip, buy-and-hold and institutional mix, neighbourhood demand, \
cash price ranges from the last 12 months, six-month trend in investor closings.

Phase 8 - Investment rating from 1 to 10 with a short justification.

Phase 9 - Acquisition agent notes
   * {notes_line}
   * Pick a rehab level from the notes: Light = $20/sq ft, Medium = $30/sq ft, \
Heavy = $40/sq ft, and give the repair estimate in dollars.{rehab_default}

Phase 10 - As-is list price that would draw an accepted offer at list within 21 days.

Phase 11 - Offers
   * Cash MAO = adjusted buying % x ARV - $30,000 - repairs (cap 75% outside hot markets).
   * Novation MAO = as-is list price x buying % - $30,000 - $5,000 cleaning; it must exceed \
the cash MAO.

Output, in Markdown: property specs; ARV with comps (address, condition, price per sq ft); \
as-is value with distressed comps; rehab level and repair cost; buying % rationale; rental \
summary; crime summary; school summary; cash buyer summary; investment rating; as-is list \
price; final cash and novation offers."
    );

    if let Some(extra) = emphasis(analysis_type) {
        prompt.push_str("\n\n");
        prompt.push_str(extra);
    }
    prompt
}
