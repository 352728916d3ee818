use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use surge_http::HttpResponse;

/// What a check sees after one request.
#[derive(Debug, Clone, Copy)]
pub struct CheckInput<'a> {
    /// `None` when the request failed at the transport level.
    pub response: Option<&'a HttpResponse>,
    pub duration: Duration,
}

impl CheckInput<'_> {
    pub fn status(&self) -> Option<u16> {
        self.response.map(|r| r.status)
    }
}

pub type CheckFn = Arc<dyn Fn(&CheckInput<'_>) -> bool + Send + Sync + 'static>;

/// Named predicate over a response, recorded into the `checks` rate with a `check` tag.
#[derive(Clone)]
pub struct Check {
    pub name: String,
    predicate: CheckFn,
}

impl Check {
    pub fn new(name: impl Into<String>, predicate: CheckFn) -> Self {
        Self {
            name: name.into(),
            predicate,
        }
    }

    pub fn status(name: impl Into<String>, expected: u16) -> Self {
        Self::new(
            name,
            Arc::new(move |input: &CheckInput<'_>| input.status() == Some(expected)),
        )
    }

    pub fn duration_below(name: impl Into<String>, limit: Duration) -> Self {
        Self::new(
            name,
            Arc::new(move |input: &CheckInput<'_>| input.duration < limit),
        )
    }

    pub fn evaluate(&self, input: &CheckInput<'_>) -> bool {
        (self.predicate)(input)
    }
}

impl fmt::Debug for Check {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Check").field("name", &self.name).finish()
    }
}
