//! Bundled token records used when no live snapshot is available.
//!
//! Ids use the same provider slugs as the live query, so streamed prices
//! overlay these records exactly like live ones.

use crate::models::{Category, Token};

struct Sample {
    id: &'static str,
    name: &'static str,
    symbol: &'static str,
    price: f64,
    change_1h: f64,
    change_24h: f64,
    change_7d: f64,
    volume_24h: f64,
    market_cap: f64,
    category: Category,
    verified: bool,
    pair: Option<&'static str>,
}

const SAMPLES: &[Sample] = &[
    Sample {
        id: "bitcoin",
        name: "Bitcoin",
        symbol: "BTC",
        price: 67_250.12,
        change_1h: 0.21,
        change_24h: 1.84,
        change_7d: 4.12,
        volume_24h: 28_400_000_000.0,
        market_cap: 1_325_000_000_000.0,
        category: Category::Migrated,
        verified: true,
        pair: Some("BTC/USDT"),
    },
    Sample {
        id: "ethereum",
        name: "Ethereum",
        symbol: "ETH",
        price: 3_512.44,
        change_1h: -0.12,
        change_24h: 2.31,
        change_7d: 6.05,
        volume_24h: 14_900_000_000.0,
        market_cap: 422_000_000_000.0,
        category: Category::Migrated,
        verified: true,
        pair: Some("ETH/USDT"),
    },
    Sample {
        id: "solana",
        name: "Solana",
        symbol: "SOL",
        price: 148.73,
        change_1h: 0.54,
        change_24h: -1.27,
        change_7d: 9.88,
        volume_24h: 2_650_000_000.0,
        market_cap: 68_700_000_000.0,
        category: Category::Migrated,
        verified: true,
        pair: Some("SOL/USDC"),
    },
    Sample {
        id: "ripple",
        name: "XRP",
        symbol: "XRP",
        price: 0.5234,
        change_1h: 0.03,
        change_24h: -0.66,
        change_7d: -2.41,
        volume_24h: 1_120_000_000.0,
        market_cap: 29_100_000_000.0,
        category: Category::FinalStretch,
        verified: true,
        pair: None,
    },
    Sample {
        id: "cardano",
        name: "Cardano",
        symbol: "ADA",
        price: 0.4581,
        change_1h: -0.31,
        change_24h: 0.94,
        change_7d: 3.37,
        volume_24h: 412_000_000.0,
        market_cap: 16_200_000_000.0,
        category: Category::FinalStretch,
        verified: true,
        pair: None,
    },
    Sample {
        id: "dogecoin",
        name: "Dogecoin",
        symbol: "DOGE",
        price: 0.1593,
        change_1h: 1.12,
        change_24h: 5.76,
        change_7d: 12.4,
        volume_24h: 1_870_000_000.0,
        market_cap: 23_000_000_000.0,
        category: Category::FinalStretch,
        verified: true,
        pair: Some("DOGE/USDT"),
    },
    Sample {
        id: "shiba-inu",
        name: "Shiba Inu",
        symbol: "SHIB",
        price: 0.00002431,
        change_1h: 0.88,
        change_24h: -3.12,
        change_7d: -7.9,
        volume_24h: 530_000_000.0,
        market_cap: 14_300_000_000.0,
        category: Category::NewPairs,
        verified: true,
        pair: None,
    },
    Sample {
        id: "sui",
        name: "Sui",
        symbol: "SUI",
        price: 1.087,
        change_1h: 2.04,
        change_24h: 8.51,
        change_7d: 21.3,
        volume_24h: 390_000_000.0,
        market_cap: 2_800_000_000.0,
        category: Category::NewPairs,
        verified: false,
        pair: Some("SUI/USDC"),
    },
    Sample {
        id: "aptos",
        name: "Aptos",
        symbol: "APT",
        price: 7.34,
        change_1h: -0.47,
        change_24h: -2.05,
        change_7d: 1.16,
        volume_24h: 182_000_000.0,
        market_cap: 3_300_000_000.0,
        category: Category::NewPairs,
        verified: false,
        pair: None,
    },
    Sample {
        id: "chainlink",
        name: "Chainlink",
        symbol: "LINK",
        price: 14.62,
        change_1h: 0.19,
        change_24h: 3.48,
        change_7d: 7.72,
        volume_24h: 356_000_000.0,
        market_cap: 8_600_000_000.0,
        category: Category::Trending,
        verified: true,
        pair: None,
    },
    Sample {
        id: "arbitrum",
        name: "Arbitrum",
        symbol: "ARB",
        price: 0.8123,
        change_1h: -1.05,
        change_24h: -4.37,
        change_7d: -10.2,
        volume_24h: 298_000_000.0,
        market_cap: 2_700_000_000.0,
        category: Category::Trending,
        verified: true,
        pair: None,
    },
    Sample {
        id: "optimism",
        name: "Optimism",
        symbol: "OP",
        price: 1.764,
        change_1h: 0.72,
        change_24h: 6.14,
        change_7d: 15.8,
        volume_24h: 241_000_000.0,
        market_cap: 2_000_000_000.0,
        category: Category::Trending,
        verified: true,
        pair: None,
    },
];

/// The full bundled dataset.
pub fn tokens() -> Vec<Token> {
    SAMPLES
        .iter()
        .map(|s| Token {
            id: s.id.to_string(),
            name: s.name.to_string(),
            symbol: s.symbol.to_string(),
            price: s.price,
            change_1h: s.change_1h,
            change_24h: s.change_24h,
            change_7d: s.change_7d,
            volume_24h: s.volume_24h,
            market_cap: s.market_cap,
            category: s.category,
            logo: None,
            verified: Some(s.verified),
            pair: s.pair.map(str::to_string),
        })
        .collect()
}
