use crate::config::BandConfig;
use crate::models::{Category, Token};
use serde::Deserialize;

/// Market record as returned by a CoinGecko-compatible `/coins/markets` endpoint.
///
/// Every numeric field is optional; the provider sends `null` or omits them freely.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct MarketRecord {
    pub id: String,
    pub symbol: String,
    pub name: String,
    #[serde(default)]
    pub image: Option<String>,
    #[serde(default)]
    pub current_price: Option<f64>,
    #[serde(default)]
    pub market_cap: Option<f64>,
    #[serde(default)]
    pub market_cap_rank: Option<u32>,
    #[serde(default)]
    pub total_volume: Option<f64>,
    #[serde(default)]
    pub price_change_percentage_24h: Option<f64>,
    #[serde(default)]
    pub price_change_percentage_1h_in_currency: Option<f64>,
    #[serde(default)]
    pub price_change_percentage_7d_in_currency: Option<f64>,
}

/// How a snapshot assigns categories.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CategoryRule {
    /// Positional bands over market cap rank.
    Bands(BandConfig),
    /// Every record gets the same tag (trending lists).
    Fixed(Category),
}

/// Tokens ranked at or below this market cap rank are flagged verified.
const VERIFIED_MAX_RANK: u32 = 100;

/// Category for a 0-based position in the market-cap-descending ordering.
pub fn band_category(position: usize, bands: &BandConfig) -> Category {
    if position < bands.migrated {
        Category::Migrated
    } else if position < bands.migrated.saturating_add(bands.final_stretch) {
        Category::FinalStretch
    } else {
        Category::NewPairs
    }
}

fn finite_or_zero(v: Option<f64>) -> f64 {
    v.filter(|x| x.is_finite()).unwrap_or(0.0)
}

/// Map one provider record into a `Token`. Missing numbers become `0.0`.
pub fn normalize_record(record: MarketRecord, category: Category) -> Token {
    Token {
        symbol: record.symbol.to_uppercase(),
        price: finite_or_zero(record.current_price),
        change_1h: finite_or_zero(record.price_change_percentage_1h_in_currency),
        change_24h: finite_or_zero(record.price_change_percentage_24h),
        change_7d: finite_or_zero(record.price_change_percentage_7d_in_currency),
        volume_24h: finite_or_zero(record.total_volume),
        market_cap: finite_or_zero(record.market_cap),
        category,
        logo: record.image.filter(|s| !s.is_empty()),
        verified: record.market_cap_rank.map(|r| r <= VERIFIED_MAX_RANK),
        pair: None,
        id: record.id,
        name: record.name,
    }
}

/// Normalize a full response. For `Bands` the records are stable-sorted by
/// market cap descending first, so equal caps keep the provider's order.
pub fn normalize_snapshot(mut records: Vec<MarketRecord>, rule: &CategoryRule) -> Vec<Token> {
    match rule {
        CategoryRule::Fixed(category) => records
            .into_iter()
            .map(|r| normalize_record(r, *category))
            .collect(),
        CategoryRule::Bands(bands) => {
            records.sort_by(|a, b| {
                finite_or_zero(b.market_cap).total_cmp(&finite_or_zero(a.market_cap))
            });
            records
                .into_iter()
                .enumerate()
                .map(|(pos, r)| normalize_record(r, band_category(pos, bands)))
                .collect()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn full_record() -> MarketRecord {
        MarketRecord {
            id: "solana".into(),
            symbol: "sol".into(),
            name: "Solana".into(),
            image: Some("https://img.example/sol.png".into()),
            current_price: Some(142.37),
            market_cap: Some(66_000_000_000.0),
            market_cap_rank: Some(5),
            total_volume: Some(2_100_000_000.0),
            price_change_percentage_24h: Some(-1.8),
            price_change_percentage_1h_in_currency: Some(0.4),
            price_change_percentage_7d_in_currency: Some(6.2),
        }
    }

    fn ranked(n: usize) -> Vec<MarketRecord> {
        (0..n)
            .map(|i| MarketRecord {
                id: format!("tok-{i}"),
                symbol: format!("t{i}"),
                name: format!("Token {i}"),
                market_cap: Some(1_000_000.0 - i as f64),
                ..Default::default()
            })
            .collect()
    }

    #[test]
    fn optional_fields_default_to_zero() {
        let full = normalize_record(full_record(), Category::Migrated);
        let bare = normalize_record(
            MarketRecord {
                id: "solana".into(),
                symbol: "sol".into(),
                name: "Solana".into(),
                ..Default::default()
            },
            Category::Migrated,
        );

        assert_eq!(full.id, bare.id);
        assert_eq!(full.name, bare.name);
        assert_eq!(full.symbol, "SOL");
        assert_eq!(bare.symbol, "SOL");
        assert_eq!(full.category, bare.category);
        assert_eq!(full.change_1h, 0.4);
        assert_eq!(full.verified, Some(true));

        for v in [
            bare.price,
            bare.change_1h,
            bare.change_24h,
            bare.change_7d,
            bare.volume_24h,
            bare.market_cap,
        ] {
            assert_eq!(v, 0.0);
        }
        assert_eq!(bare.logo, None);
        assert_eq!(bare.verified, None);
    }

    #[test]
    fn null_fields_parse_as_missing() {
        let raw = r#"[{
            "id": "bitcoin", "symbol": "btc", "name": "Bitcoin",
            "current_price": 67000.5, "market_cap": null,
            "price_change_percentage_24h": null, "market_cap_rank": 1
        }]"#;
        let records: Vec<MarketRecord> = serde_json::from_str(raw).expect("json should parse");
        let token = normalize_record(records[0].clone(), Category::Trending);
        assert_eq!(token.price, 67000.5);
        assert_eq!(token.market_cap, 0.0);
        assert_eq!(token.change_24h, 0.0);
    }

    #[test]
    fn bands_partition_thirty_records() {
        let bands = BandConfig {
            migrated: 10,
            final_stretch: 15,
        };
        let tokens = normalize_snapshot(ranked(30), &CategoryRule::Bands(bands));
        assert_eq!(tokens.len(), 30);
        for (i, t) in tokens.iter().enumerate() {
            let expected = match i {
                0..=9 => Category::Migrated,
                10..=24 => Category::FinalStretch,
                _ => Category::NewPairs,
            };
            assert_eq!(t.category, expected, "position {i}");
            assert_eq!(t.id, format!("tok-{i}"));
        }
    }

    #[test]
    fn bands_follow_market_cap_not_response_order() {
        let mut records = ranked(3);
        records.reverse();
        let bands = BandConfig {
            migrated: 1,
            final_stretch: 1,
        };
        let tokens = normalize_snapshot(records, &CategoryRule::Bands(bands));
        let ids: Vec<&str> = tokens.iter().map(|t| t.id.as_str()).collect();
        assert_eq!(ids, vec!["tok-0", "tok-1", "tok-2"]);
        assert_eq!(tokens[0].category, Category::Migrated);
        assert_eq!(tokens[2].category, Category::NewPairs);
    }

    #[test]
    fn equal_caps_keep_response_order() {
        let records: Vec<MarketRecord> = ["a", "b", "c"]
            .iter()
            .map(|id| MarketRecord {
                id: id.to_string(),
                symbol: id.to_string(),
                name: id.to_string(),
                market_cap: Some(5.0),
                ..Default::default()
            })
            .collect();
        let bands = BandConfig {
            migrated: 1,
            final_stretch: 1,
        };
        let first = normalize_snapshot(records.clone(), &CategoryRule::Bands(bands));
        let second = normalize_snapshot(records, &CategoryRule::Bands(bands));
        assert_eq!(first, second);
        assert_eq!(first[0].id, "a");
        assert_eq!(first[1].category, Category::FinalStretch);
    }

    #[test]
    fn fixed_rule_tags_everything() {
        let tokens = normalize_snapshot(ranked(4), &CategoryRule::Fixed(Category::Trending));
        assert!(tokens.iter().all(|t| t.category == Category::Trending));
    }
}
