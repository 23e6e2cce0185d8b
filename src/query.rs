//! Local filtering, sorting and paging over a read model snapshot.

use crate::models::{Category, ReadModel, Token};
use std::cmp::Ordering;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortKey {
    Name,
    Price,
    Change24h,
    MarketCap,
    Volume,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortOrder {
    Asc,
    Desc,
}

#[derive(Debug, Clone)]
pub struct TokenQuery {
    pub category: Option<Category>,
    /// Case-insensitive substring of name or symbol.
    pub search: Option<String>,
    pub sort_by: SortKey,
    pub order: SortOrder,
    /// 1-based.
    pub page: usize,
    pub per_page: usize,
}

impl Default for TokenQuery {
    fn default() -> Self {
        Self {
            category: None,
            search: None,
            sort_by: SortKey::MarketCap,
            order: SortOrder::Desc,
            page: 1,
            per_page: 15,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TokenPage {
    pub items: Vec<Token>,
    /// Matches before paging.
    pub total: usize,
    pub page: usize,
    pub total_pages: usize,
}

fn compare(a: &Token, b: &Token, key: SortKey) -> Ordering {
    match key {
        SortKey::Name => a.name.to_lowercase().cmp(&b.name.to_lowercase()),
        SortKey::Price => a.price.total_cmp(&b.price),
        SortKey::Change24h => a.change_24h.total_cmp(&b.change_24h),
        SortKey::MarketCap => a.market_cap.total_cmp(&b.market_cap),
        SortKey::Volume => a.volume_24h.total_cmp(&b.volume_24h),
    }
}

impl TokenQuery {
    fn matches(&self, token: &Token) -> bool {
        if let Some(category) = self.category {
            if token.category != category {
                return false;
            }
        }
        match self.search.as_deref().map(str::trim) {
            Some(needle) if !needle.is_empty() => {
                let needle = needle.to_lowercase();
                token.name.to_lowercase().contains(&needle)
                    || token.symbol.to_lowercase().contains(&needle)
            }
            _ => true,
        }
    }

    /// Filter, sort (ties broken by id) and cut one page. A page past the end
    /// is clamped to the last page.
    pub fn run(&self, model: &ReadModel) -> TokenPage {
        let mut matched: Vec<&Token> = model.tokens.values().filter(|t| self.matches(t)).collect();
        matched.sort_by(|a, b| {
            let ord = match self.order {
                SortOrder::Asc => compare(a, b, self.sort_by),
                SortOrder::Desc => compare(b, a, self.sort_by),
            };
            ord.then_with(|| a.id.cmp(&b.id))
        });

        let per_page = self.per_page.max(1);
        let total = matched.len();
        let total_pages = total.div_ceil(per_page).max(1);
        let page = self.page.clamp(1, total_pages);
        let items = matched
            .into_iter()
            .skip((page - 1) * per_page)
            .take(per_page)
            .cloned()
            .collect();

        TokenPage {
            items,
            total,
            page,
            total_pages,
        }
    }
}

/// Top `n` gainers and losers by 24h change.
pub fn top_movers(model: &ReadModel, n: usize) -> (Vec<Token>, Vec<Token>) {
    let mut all: Vec<&Token> = model.tokens.values().collect();
    all.sort_by(|a, b| {
        b.change_24h
            .total_cmp(&a.change_24h)
            .then_with(|| a.id.cmp(&b.id))
    });
    let gainers = all
        .iter()
        .filter(|t| t.change_24h > 0.0)
        .take(n)
        .map(|t| (*t).clone())
        .collect();
    let losers = all
        .iter()
        .rev()
        .filter(|t| t.change_24h < 0.0)
        .take(n)
        .map(|t| (*t).clone())
        .collect();
    (gainers, losers)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fallback;

    fn model() -> ReadModel {
        ReadModel {
            tokens: fallback::tokens()
                .into_iter()
                .map(|t| (t.id.clone(), t))
                .collect(),
            ..Default::default()
        }
    }

    #[test]
    fn default_sorts_by_market_cap_desc() {
        let page = TokenQuery::default().run(&model());
        assert_eq!(page.items[0].id, "bitcoin");
        assert_eq!(page.total, fallback::tokens().len());
        assert!(
            page.items
                .windows(2)
                .all(|w| w[0].market_cap >= w[1].market_cap)
        );
    }

    #[test]
    fn search_matches_name_or_symbol() {
        let q = TokenQuery {
            search: Some("  eth ".into()),
            ..Default::default()
        };
        let page = q.run(&model());
        let ids: Vec<&str> = page.items.iter().map(|t| t.id.as_str()).collect();
        assert_eq!(ids, vec!["ethereum"]);

        let q = TokenQuery {
            search: Some("doge".into()),
            ..Default::default()
        };
        assert_eq!(q.run(&model()).items[0].symbol, "DOGE");
    }

    #[test]
    fn category_filter_and_name_sort() {
        let q = TokenQuery {
            category: Some(Category::Trending),
            sort_by: SortKey::Name,
            order: SortOrder::Asc,
            ..Default::default()
        };
        let names: Vec<String> = q.run(&model()).items.into_iter().map(|t| t.name).collect();
        assert_eq!(names, vec!["Arbitrum", "Chainlink", "Optimism"]);
    }

    #[test]
    fn paging_clamps_past_end() {
        let q = TokenQuery {
            per_page: 5,
            page: 99,
            ..Default::default()
        };
        let page = q.run(&model());
        assert_eq!(page.total_pages, 3);
        assert_eq!(page.page, 3);
        assert_eq!(page.items.len(), 2);
    }

    #[test]
    fn empty_model_has_one_empty_page() {
        let page = TokenQuery::default().run(&ReadModel::default());
        assert_eq!(page.total, 0);
        assert_eq!(page.total_pages, 1);
        assert!(page.items.is_empty());
    }

    #[test]
    fn movers_split_by_sign() {
        let (gainers, losers) = top_movers(&model(), 2);
        assert_eq!(gainers.len(), 2);
        assert_eq!(gainers[0].id, "sui");
        assert_eq!(losers[0].id, "arbitrum");
        assert!(gainers.iter().all(|t| t.change_24h > 0.0));
        assert!(losers.iter().all(|t| t.change_24h < 0.0));
    }
}
