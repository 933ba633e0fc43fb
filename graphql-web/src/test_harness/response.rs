use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;

use super::path::PathSpec;
use crate::graphql;

/// A response under test, shared by the specs derived from it.
pub(super) struct ResponseContainer {
    request: String,
    response: graphql::Response,
    json: serde_json::Value,
    expected: Mutex<Vec<bool>>,
}

impl ResponseContainer {
    pub(super) fn new(request: String, response: graphql::Response) -> Self {
        let json = serde_json::to_value(&response).unwrap_or_default();
        let expected = Mutex::new(vec![false; response.errors.len()]);
        Self {
            request,
            response,
            json,
            expected,
        }
    }

    pub(super) fn json(&self) -> &serde_json::Value {
        &self.json
    }

    /// Fails the test, with the request appended to `message`.
    pub(super) fn fail(&self, message: impl fmt::Display) -> ! {
        panic!("{message}\nRequest: {}", self.request)
    }

    /// Runs `assertion`, failing with the request if it panics.
    pub(super) fn check(&self, assertion: impl FnOnce()) {
        if let Err(panic) = std::panic::catch_unwind(std::panic::AssertUnwindSafe(assertion)) {
            let message = panic
                .downcast_ref::<String>()
                .map(String::as_str)
                .or_else(|| panic.downcast_ref::<&str>().copied())
                .unwrap_or("assertion failed");
            self.fail(message)
        }
    }

    fn mark_expected(&self, predicate: impl Fn(&graphql::Error) -> bool) -> usize {
        let mut expected = self.expected.lock();
        let mut matched = 0;
        for (error, expected) in self.response.errors.iter().zip(expected.iter_mut()) {
            if predicate(error) {
                *expected = true;
                matched += 1;
            }
        }
        matched
    }

    /// Fails if some errors were not filtered out.
    pub(super) fn verify_errors(&self) {
        let expected = self.expected.lock();
        let unexpected: Vec<&graphql::Error> = self
            .response
            .errors
            .iter()
            .zip(expected.iter())
            .filter(|(_, expected)| !**expected)
            .map(|(error, _)| error)
            .collect();
        if unexpected.is_empty() {
            return;
        }
        let total = self.response.errors.len();
        let count = if unexpected.len() == total {
            total.to_string()
        } else {
            format!("{} of {total} total", unexpected.len())
        };
        let listed = serde_json::to_string(&unexpected).unwrap_or_default();
        drop(expected);
        self.fail(format!(
            "Response has {count} unexpected error(s). If expected, please filter them out: {listed}"
        ))
    }
}

/// Verifies a single response: its errors, and its data through [`PathSpec`]s.
#[derive(Clone)]
pub struct ResponseSpec {
    container: Arc<ResponseContainer>,
}

impl ResponseSpec {
    pub(super) fn new(request: String, response: graphql::Response) -> Self {
        Self {
            container: Arc::new(ResponseContainer::new(request, response)),
        }
    }

    /// Switches to a path of the response, e.g. `project.releases[*].version`.
    ///
    /// Paths not starting with `$` are relative to `data`; an empty path
    /// selects `data` itself. Fails if the response has errors that were not
    /// filtered out.
    pub fn path(&self, path: &str) -> PathSpec {
        self.container.verify_errors();
        PathSpec::new(self.container.clone(), path)
    }

    /// Switches to the errors of the response.
    pub fn errors(&self) -> ErrorSpec {
        ErrorSpec {
            container: self.container.clone(),
        }
    }

    /// The response as received.
    pub fn response(&self) -> &graphql::Response {
        &self.container.response
    }
}

impl fmt::Debug for ResponseSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResponseSpec")
            .field("request", &self.container.request)
            .field("response", &self.container.response)
            .finish()
    }
}

/// Filters out expected errors and verifies the rest.
#[derive(Clone)]
pub struct ErrorSpec {
    container: Arc<ResponseContainer>,
}

impl ErrorSpec {
    /// Marks the errors matching `predicate` as expected.
    pub fn filter(self, predicate: impl Fn(&graphql::Error) -> bool) -> Self {
        self.container.mark_expected(predicate);
        self
    }

    /// Like [`filter`](Self::filter), failing if no error matches.
    pub fn expect(self, predicate: impl Fn(&graphql::Error) -> bool) -> Self {
        if self.container.mark_expected(predicate) == 0 {
            self.container.fail("No matching errors.")
        }
        self
    }

    /// Fails if some errors were not filtered out.
    pub fn verify(self) -> ResponseSpec {
        self.container.verify_errors();
        ResponseSpec {
            container: self.container,
        }
    }

    /// Runs `assertion` on all the errors, filtered out or not.
    pub fn satisfy(self, assertion: impl FnOnce(&[graphql::Error])) -> ResponseSpec {
        let errors = self.container.response.errors.as_slice();
        self.container.check(|| assertion(errors));
        ResponseSpec {
            container: self.container,
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json_bytes::json;

    use super::*;
    use crate::graphql::ErrorClassification;
    use crate::json_ext::Path;

    fn response_with_errors() -> ResponseSpec {
        ResponseSpec::new(
            "Query='{ project(slug: \"missing\") { name } }'".to_string(),
            graphql::Response::builder()
                .data(json!({ "project": null }))
                .error(
                    graphql::Error::builder()
                        .message("No such project")
                        .path(Path::from("project"))
                        .classification(ErrorClassification::NotFound)
                        .build(),
                )
                .error(graphql::Error::builder().message("Flaky").build())
                .build(),
        )
    }

    fn panic_message(run: impl FnOnce()) -> String {
        let panic = std::panic::catch_unwind(std::panic::AssertUnwindSafe(run)).unwrap_err();
        panic.downcast_ref::<String>().cloned().unwrap()
    }

    #[test]
    fn unexpected_errors_fail_path_access() {
        let spec = response_with_errors();
        let message = panic_message(|| {
            spec.path("project");
        });
        assert!(message.starts_with("Response has 2 unexpected error(s). If expected"));
        assert!(message.contains("No such project"));
        assert!(message.ends_with("\nRequest: Query='{ project(slug: \"missing\") { name } }'"));
    }

    #[test]
    fn partially_filtered_errors_are_counted() {
        let spec = response_with_errors();
        let message = panic_message(|| {
            spec.errors()
                .filter(|error| error.json_path() == "$.project")
                .verify();
        });
        assert!(message.starts_with("Response has 1 of 2 total unexpected error(s)"));
        assert!(message.contains("Flaky"));
        assert!(!message.contains("No such project"));
    }

    #[test]
    fn filtered_errors_remain_visible() {
        let spec = response_with_errors();
        spec.errors()
            .filter(|error| error.classification() == ErrorClassification::NotFound)
            .filter(|error| error.message == "Flaky")
            .satisfy(|errors| assert_eq!(errors.len(), 2))
            .path("project")
            .value_does_not_exist();
    }

    #[test]
    fn expect_requires_a_match() {
        let spec = response_with_errors();
        let message = panic_message(|| {
            spec.errors().expect(|error| error.message == "Other");
        });
        assert!(message.starts_with("No matching errors."));
    }
}
