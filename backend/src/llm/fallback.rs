//! Canned report served when the completion provider is unavailable.
//!
//! Figures come from a fixed market profile picked by matching the address,
//! so the same input always yields the same report.

use chrono::{NaiveDate, Utc};

use crate::models::AnalysisType;

/// Living area assumed for the subject property.
pub const SUBJECT_SQFT: i64 = 1850;

const AS_IS_RATIO: f64 = 0.87;
const CASH_BUYING_RATIO: f64 = 0.73;
const FIXED_COSTS: f64 = 30_000.0;
const LIST_PRICE_MARKUP: f64 = 1.05;
const CASH_FLOW_RATIO: f64 = 0.2;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MarketProfile {
    pub name: &'static str,
    pub avg_price: i64,
    pub rent_per_sqft: f64,
    pub crime_rating: u8,
}

const AUSTIN: MarketProfile = MarketProfile {
    name: "Austin, TX",
    avg_price: 485_000,
    rent_per_sqft: 1.30,
    crime_rating: 7,
};

/// Checked in order; the first profile with a matching keyword wins.
const PROFILES: [(&[&str], MarketProfile); 4] = [
    (
        &["san francisco", "california"],
        MarketProfile {
            name: "San Francisco, CA",
            avg_price: 1_250_000,
            rent_per_sqft: 3.50,
            crime_rating: 6,
        },
    ),
    (
        &["miami", "florida"],
        MarketProfile {
            name: "Miami, FL",
            avg_price: 675_000,
            rent_per_sqft: 2.20,
            crime_rating: 6,
        },
    ),
    (
        &["new york"],
        MarketProfile {
            name: "New York, NY",
            avg_price: 895_000,
            rent_per_sqft: 4.20,
            crime_rating: 6,
        },
    ),
    (
        &["dallas", "texas"],
        MarketProfile {
            name: "Dallas, TX",
            avg_price: 425_000,
            rent_per_sqft: 1.30,
            crime_rating: 8,
        },
    ),
];

pub fn market_profile(address: &str) -> MarketProfile {
    let address = address.to_lowercase();
    PROFILES
        .iter()
        .find(|(keywords, _)| keywords.iter().any(|k| address.contains(k)))
        .map(|(_, profile)| *profile)
        .unwrap_or(AUSTIN)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RehabLevel {
    Light,
    Medium,
    Heavy,
}

impl RehabLevel {
    pub fn from_notes(notes: Option<&str>) -> Self {
        let notes = notes.unwrap_or_default().to_lowercase();
        if notes.contains("heavy") {
            RehabLevel::Heavy
        } else if notes.contains("medium") {
            RehabLevel::Medium
        } else {
            RehabLevel::Light
        }
    }

    pub fn cost_per_sqft(&self) -> i64 {
        match self {
            RehabLevel::Light => 20,
            RehabLevel::Medium => 30,
            RehabLevel::Heavy => 40,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            RehabLevel::Light => "Light",
            RehabLevel::Medium => "Medium",
            RehabLevel::Heavy => "Heavy",
        }
    }
}

/// Derived figures for the canned report.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Estimate {
    pub profile: MarketProfile,
    pub rehab: RehabLevel,
    pub arv: i64,
    pub as_is: i64,
    pub repair_cost: i64,
    pub monthly_rent: i64,
    pub monthly_cash_flow: i64,
    pub cash_mao: i64,
    pub list_price: i64,
    pub investment_rating: u8,
}

pub fn estimate(address: &str, notes: Option<&str>) -> Estimate {
    let profile = market_profile(address);
    let rehab = RehabLevel::from_notes(notes);
    let arv = profile.avg_price;
    let repair_cost = rehab.cost_per_sqft() * SUBJECT_SQFT;
    let as_is = (arv as f64 * AS_IS_RATIO).round() as i64;
    let monthly_rent = (SUBJECT_SQFT as f64 * profile.rent_per_sqft).round() as i64;
    let cash_mao = (arv as f64 * CASH_BUYING_RATIO - FIXED_COSTS - repair_cost as f64).round() as i64;

    // Gross yield drives the rating, with one point off for high-crime areas.
    let gross_yield = (monthly_rent * 12) as f64 / arv as f64;
    let mut rating: u8 = if gross_yield >= 0.05 { 9 } else { 8 };
    if profile.crime_rating >= 8 {
        rating -= 1;
    }

    Estimate {
        profile,
        rehab,
        arv,
        as_is,
        repair_cost,
        monthly_rent,
        monthly_cash_flow: (monthly_rent as f64 * CASH_FLOW_RATIO).round() as i64,
        cash_mao,
        list_price: (as_is as f64 * LIST_PRICE_MARKUP).round() as i64,
        investment_rating: rating,
    }
}

/// `1234567` -> `1,234,567`.
pub fn format_usd(amount: i64) -> String {
    let digits = amount.unsigned_abs().to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3 + 1);
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(ch);
    }
    if amount < 0 {
        format!("-{}", out)
    } else {
        out
    }
}

/// Canned Markdown report dated today.
pub fn canned_analysis(address: &str, notes: Option<&str>, analysis_type: AnalysisType) -> String {
    canned_analysis_on(address, notes, analysis_type, Utc::now().date_naive())
}

pub fn canned_analysis_on(
    address: &str,
    notes: Option<&str>,
    analysis_type: AnalysisType,
    date: NaiveDate,
) -> String {
    let e = estimate(address, notes);
    let notes = notes.map(str::trim).filter(|n| !n.is_empty());
    let notes_line = notes
        .map(|n| format!("**Notes:** {}\n", n))
        .unwrap_or_default();

    format!(
        "# Real Estate Analysis - {market}

**Address:** {address}
{notes_line}**Analysis date:** {date}
**Analysis type:** {kind}

> Demo report generated from regional averages. Configure an LLM API key for a full analysis.

## Property
- **Specs:** 3 bd / 2 ba, {sqft} sq ft, built 2008
- **ARV:** ${arv}
- **As-is value:** ${as_is}

## Financials
- **Monthly rent:** ${rent}
- **Cash flow:** +${cash_flow}/month
- **Crime rating:** {crime}/10
- **Investment rating:** {rating}/10

## Renovation
- **Rehab level:** {rehab}
- **Repair cost:** ${repairs}

## Offers
- **Cash MAO:** ${mao}
- **As-is list price:** ${list}

*Regional estimate for {market}*",
        market = e.profile.name,
        date = date.format("%B %-d, %Y"),
        kind = analysis_type.as_str(),
        sqft = format_usd(SUBJECT_SQFT),
        arv = format_usd(e.arv),
        as_is = format_usd(e.as_is),
        rent = format_usd(e.monthly_rent),
        cash_flow = format_usd(e.monthly_cash_flow),
        crime = e.profile.crime_rating,
        rating = e.investment_rating,
        rehab = e.rehab.label(),
        repairs = format_usd(e.repair_cost),
        mao = format_usd(e.cash_mao),
        list = format_usd(e.list_price),
    )
}
