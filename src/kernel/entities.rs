use uuid::Uuid;

pub type UserId = Uuid;

const DEFAULT_PAGE_SIZE: u32 = 20;
const MAX_PAGE_SIZE: u32 = 100;

/// One-based page selection for the read-side listing queries.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Page {
    pub number: u32,
    pub size:   u32,
}

impl Page {
    pub fn new(number: Option<u32>, size: Option<u32>) -> Self {
        Self {
            number: number.unwrap_or(1).max(1),
            size:   size
                .unwrap_or(DEFAULT_PAGE_SIZE)
                .clamp(1, MAX_PAGE_SIZE),
        }
    }

    pub fn limit(&self) -> i64 {
        self.size as i64
    }

    pub fn offset(&self) -> i64 {
        (self.number as i64 - 1) * self.size as i64
    }
}

#[cfg(test)]
mod tests {
    use super::Page;

    #[test]
    fn page_defaults_and_clamps() {
        let page = Page::new(None, None);
        assert_eq!(page.number, 1);
        assert_eq!(page.size, 20);
        assert_eq!(page.offset(), 0);

        let page = Page::new(Some(0), Some(1000));
        assert_eq!(page.number, 1);
        assert_eq!(page.size, 100);

        let page = Page::new(Some(3), Some(10));
        assert_eq!(page.offset(), 20);
        assert_eq!(page.limit(), 10);
    }
}
