use std::fmt;
use std::future::Future;

use log::{info, warn};
use thiserror::Error;

/// Every source in an ordered list failed.
#[derive(Debug, Error)]
#[error("{}", describe(&self.failures))]
pub struct AcquireError<E: fmt::Display + fmt::Debug> {
    pub failures: Vec<(String, E)>,
}

fn describe<E: fmt::Display>(failures: &[(String, E)]) -> String {
    if failures.is_empty() {
        return "no sources configured".to_string();
    }
    let details: Vec<String> = failures
        .iter()
        .map(|(source, err)| format!("{source}: {err}"))
        .collect();
    format!("all {} source(s) failed: {}", failures.len(), details.join("; "))
}

/// Tries each source in order and returns the first successful acquisition.
///
/// An attempt either yields the complete resource set or fails as a whole;
/// partial results from a failed source are never mixed with the next one.
pub async fn first_success<S, T, E, F, Fut>(
    sources: impl IntoIterator<Item = S>,
    mut attempt: F,
) -> Result<(S, T), AcquireError<E>>
where
    S: fmt::Display + Clone,
    E: fmt::Display + fmt::Debug,
    F: FnMut(S) -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    let mut failures = Vec::new();
    for source in sources {
        match attempt(source.clone()).await {
            Ok(value) => {
                info!("acquired from {source}");
                return Ok((source, value));
            }
            Err(err) => {
                warn!("source {source} failed: {err}");
                failures.push((source.to_string(), err));
            }
        }
    }
    Err(AcquireError { failures })
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;

    use pollster::block_on;

    use super::*;

    #[test]
    fn first_working_source_wins() {
        let tried = RefCell::new(Vec::new());
        let result = block_on(first_success(["local", "remote", "mirror"], |source| {
            tried.borrow_mut().push(source);
            async move {
                if source == "local" {
                    Err("offline")
                } else {
                    Ok(format!("{source} bundle"))
                }
            }
        }));
        let (source, bundle) = result.unwrap();
        assert_eq!(source, "remote");
        assert_eq!(bundle, "remote bundle");
        assert_eq!(*tried.borrow(), vec!["local", "remote"]);
    }

    #[test]
    fn exhausted_sources_report_every_failure() {
        let result = block_on(first_success(["local", "remote"], |source| async move {
            Err::<(), _>(format!("{source} unreachable"))
        }));
        let err = result.unwrap_err();
        assert_eq!(err.failures.len(), 2);
        let message = err.to_string();
        assert!(message.contains("local: local unreachable"));
        assert!(message.contains("remote: remote unreachable"));
    }

    #[test]
    fn empty_source_list_fails() {
        let result = block_on(first_success(Vec::<&str>::new(), |_| async {
            Ok::<_, String>(())
        }));
        assert!(result.unwrap_err().to_string().contains("no sources configured"));
    }

    #[test]
    fn acquire_error_boxes_as_a_std_error() {
        let err = AcquireError {
            failures: vec![("webgpu".to_string(), "blocked")],
        };
        let boxed: Box<dyn std::error::Error> = Box::new(err);
        assert_eq!(boxed.to_string(), "all 1 source(s) failed: webgpu: blocked");
    }
}
