//! Purchase chat access rules.

use crate::error::MarketError;

pub const MAX_MESSAGE_CHARS: usize = 2000;

/// The two accounts bound to a purchase. Only they may read or post.
///
/// `buyer_id` is `None` once the buyer's account has been deleted; the seller
/// keeps access to the history.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Participants {
    pub buyer_id: Option<i64>,
    pub seller_id: i64,
}

impl Participants {
    pub fn includes(&self, account_id: i64) -> bool {
        self.buyer_id == Some(account_id) || account_id == self.seller_id
    }

    pub fn require(&self, account_id: i64) -> Result<(), MarketError> {
        if self.includes(account_id) {
            Ok(())
        } else {
            Err(MarketError::forbidden(
                "only the buyer and seller can access this conversation",
            ))
        }
    }
}

/// Trim and bound message text.
pub fn validate_content(content: &str) -> Result<String, MarketError> {
    let trimmed = content.trim();
    if trimmed.is_empty() {
        return Err(MarketError::validation("message must not be empty"));
    }
    if trimmed.chars().count() > MAX_MESSAGE_CHARS {
        return Err(MarketError::validation(format!(
            "message must be at most {MAX_MESSAGE_CHARS} characters"
        )));
    }
    Ok(trimmed.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn outsider_is_forbidden() {
        let p = Participants { buyer_id: Some(10), seller_id: 20 };
        assert!(p.require(10).is_ok());
        assert!(p.require(20).is_ok());
        assert_eq!(p.require(30).unwrap_err().kind(), "forbidden");
    }

    #[test]
    fn seller_keeps_access_after_buyer_deleted() {
        let p = Participants { buyer_id: None, seller_id: 20 };
        assert!(p.includes(20));
        assert!(!p.includes(10));
    }

    #[test]
    fn content_bounds() {
        assert_eq!(validate_content("  hi  ").unwrap(), "hi");
        assert!(validate_content("   ").is_err());
        assert!(validate_content(&"x".repeat(MAX_MESSAGE_CHARS + 1)).is_err());
    }
}
