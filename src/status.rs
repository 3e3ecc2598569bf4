//! Pure, stateless classification of HTTP status codes into the
//! categories the Executor and Gate reason about. No I/O, no state.

/// 200-299.
pub fn is_success(status: u16) -> bool {
    (200..300).contains(&status)
}

pub fn is_redirect_permanent(status: u16) -> bool {
    matches!(status, 301 | 308)
}

pub fn is_redirect_temporary(status: u16) -> bool {
    matches!(status, 302 | 303 | 307)
}

pub fn is_redirect(status: u16) -> bool {
    is_redirect_permanent(status) || is_redirect_temporary(status)
}

pub fn is_rate_limited(status: u16) -> bool {
    status == 429
}

pub fn is_transient(status: u16) -> bool {
    matches!(status, 500 | 502 | 503 | 504)
}

/// Union of {408, 429, 500, 502, 503, 504}. A code may also belong to a
/// more specific category (e.g. 429 is both rate-limited and
/// retryable); callers should consult the more specific predicate first.
pub fn is_retryable(status: u16) -> bool {
    matches!(status, 408 | 429 | 500 | 502 | 503 | 504)
}

pub fn is_non_retryable_client(status: u16) -> bool {
    matches!(
        status,
        400..=417 | 422 | 423 | 424 | 426 | 428 | 431 | 451
    ) && status != 408
}

/// The primary classification an Executor should act on for a given
/// status, resolving ties by specificity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Category {
    Success,
    RedirectPermanent,
    RedirectTemporary,
    RateLimited,
    Transient,
    Retryable,
    NonRetryableClient,
    Other,
}

pub fn classify(status: u16) -> Category {
    if is_success(status) {
        Category::Success
    } else if is_redirect_permanent(status) {
        Category::RedirectPermanent
    } else if is_redirect_temporary(status) {
        Category::RedirectTemporary
    } else if is_rate_limited(status) {
        Category::RateLimited
    } else if is_transient(status) {
        Category::Transient
    } else if is_retryable(status) {
        Category::Retryable
    } else if is_non_retryable_client(status) {
        Category::NonRetryableClient
    } else {
        Category::Other
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test_case(200 => true; "200 is success")]
    #[test_case(299 => true; "299 is success")]
    #[test_case(300 => false; "300 is not success")]
    #[test_case(199 => false; "199 is not success")]
    fn success_boundaries(status: u16) -> bool {
        is_success(status)
    }

    #[test]
    fn retryable_superset_matches_spec() {
        for code in [408, 429, 500, 502, 503, 504] {
            assert!(is_retryable(code), "{code} should be retryable");
        }
        assert!(!is_retryable(404));
        assert!(!is_retryable(200));
    }

    #[test]
    fn rate_limited_is_also_retryable() {
        assert!(is_rate_limited(429));
        assert!(is_retryable(429));
    }

    #[test]
    fn exactly_one_primary_category_per_status() {
        for status in 100u16..600 {
            let cat = classify(status);
            // Sanity: success codes never classify as error categories.
            if is_success(status) {
                assert_eq!(cat, Category::Success);
            }
        }
    }

    #[test]
    fn non_retryable_client_excludes_408() {
        assert!(!is_non_retryable_client(408));
        assert!(is_retryable(408));
    }

    #[test]
    fn redirect_split_matches_spec() {
        assert!(is_redirect_permanent(301));
        assert!(is_redirect_permanent(308));
        assert!(is_redirect_temporary(302));
        assert!(is_redirect_temporary(303));
        assert!(is_redirect_temporary(307));
        assert!(!is_redirect(304));
    }
}
