//! Resource coordinators.
//!
//! Each coordinator ties a policy decision to an aggregate mutation and a
//! conditional store write. Scope predicates are part of every store query,
//! so the instance checked and the instance written are always the same row.
//! Conditional writes that lose a race are retried from a fresh load, with
//! the policy check re-run against the reloaded instance.

pub mod client;
pub mod project;

pub use client::{ClientListRequest, ClientService};
pub use project::{ProjectListRequest, ProjectService};

use std::future::Future;
use std::time::Duration;

use crate::config::ServiceConfig;
use crate::error::ServiceError;
use crate::store::{PageRequest, SortOrder};

/// Conditional-write retry budget; exhaustion surfaces as
/// `UpstreamUnavailable`.
pub(crate) const MAX_WRITE_RETRIES: u32 = 3;

pub(crate) const RETRIES_EXHAUSTED: &str = "concurrent write conflict, retries exhausted";

/// Bound a store or blob operation by the configured I/O timeout.
pub(crate) async fn with_timeout<T, E>(
    limit: Duration,
    fut: impl Future<Output = Result<T, E>>,
) -> Result<T, ServiceError>
where
    E: Into<ServiceError>,
{
    match tokio::time::timeout(limit, fut).await {
        Ok(result) => result.map_err(Into::into),
        Err(_) => Err(ServiceError::Timeout),
    }
}

/// Clamp caller-supplied pagination to the configured bounds.
pub(crate) fn page_request(
    config: &ServiceConfig,
    page: Option<u32>,
    per_page: Option<u32>,
    sort_by: Option<String>,
    sort_order: Option<SortOrder>,
) -> PageRequest {
    let per_page = per_page
        .unwrap_or(config.default_page_size)
        .clamp(1, config.max_page_size);
    let mut request = PageRequest::new(page.unwrap_or(1), per_page);
    request.sort_by = sort_by;
    request.sort_order = sort_order.unwrap_or_default();
    request
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn page_request_clamps_to_configured_bounds() {
        let config = ServiceConfig::default();
        let request = page_request(&config, None, Some(10_000), None, None);
        assert_eq!(request.page, 1);
        assert_eq!(request.per_page, config.max_page_size);

        let request = page_request(&config, Some(3), None, None, None);
        assert_eq!(request.page, 3);
        assert_eq!(request.per_page, config.default_page_size);
    }

    #[tokio::test]
    async fn with_timeout_maps_elapsed_to_timeout() {
        let result: Result<(), ServiceError> =
            with_timeout(Duration::from_millis(5), async {
                tokio::time::sleep(Duration::from_secs(1)).await;
                Ok::<(), ServiceError>(())
            })
            .await;
        assert!(matches!(result, Err(ServiceError::Timeout)));
    }
}
