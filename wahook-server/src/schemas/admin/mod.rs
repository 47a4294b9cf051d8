use serde::Deserialize;
use utoipa::IntoParams;

pub mod contact;
pub mod message;
pub mod tenant;

pub const DEFAULT_PAGE_SIZE: i64 = 50;
pub const MAX_PAGE_SIZE: i64 = 200;

/// `?page=&limit=`; pages are 1-based.
#[derive(Debug, Clone, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct PageQuery {
    pub page: Option<i64>,
    pub limit: Option<i64>,
}

impl PageQuery {
    /// `(page, limit, offset)` after clamping.
    pub fn resolve(&self) -> (i64, i64, i64) {
        let page = self.page.unwrap_or(1).max(1);
        let limit = self
            .limit
            .unwrap_or(DEFAULT_PAGE_SIZE)
            .clamp(1, MAX_PAGE_SIZE);
        (page, limit, (page - 1).saturating_mul(limit))
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn page_query_is_clamped() {
        assert_eq!(PageQuery::default().resolve(), (1, 50, 0));
        let q = PageQuery { page: Some(3), limit: Some(1000) };
        assert_eq!(q.resolve(), (3, 200, 400));
        let q = PageQuery { page: Some(-2), limit: Some(0) };
        assert_eq!(q.resolve(), (1, 1, 0));
    }

    #[test]
    fn huge_page_saturates_the_offset() {
        let q = PageQuery { page: Some(i64::MAX), limit: Some(50) };
        assert_eq!(q.resolve(), (i64::MAX, 50, i64::MAX));
    }
}
