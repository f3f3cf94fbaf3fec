//! Work items and the handlers they are redelivered to.
//!
//! A [`WorkItem`] is an already-decoded request plus a flag saying whether the
//! handler produces a response. The dispatcher does not care what the handler
//! does; it only needs to know whether the send succeeded and, if not, the
//! error text.

use crate::error::TargetError;
use async_trait::async_trait;
use std::fmt;
use tower::ServiceExt;
use tower_service::Service;

/// Whether the handler for a request produces a response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResponseKind {
    /// Fire-and-forget.
    Void,
    /// The handler returns a typed response (discarded by the dispatcher).
    Response,
}

/// A decoded deferred request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkItem<Req> {
    request: Req,
    kind: ResponseKind,
    label: Option<String>,
}

impl<Req> WorkItem<Req> {
    pub fn new(request: Req, kind: ResponseKind) -> Self {
        Self { request, kind, label: None }
    }

    /// Item whose handler returns nothing.
    pub fn void(request: Req) -> Self {
        Self::new(request, ResponseKind::Void)
    }

    /// Item whose handler returns a response.
    pub fn expecting_response(request: Req) -> Self {
        Self::new(request, ResponseKind::Response)
    }

    /// Attach a label that shows up in logs.
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    pub fn request(&self) -> &Req {
        &self.request
    }

    pub fn kind(&self) -> ResponseKind {
        self.kind
    }

    pub fn expects_response(&self) -> bool {
        self.kind == ResponseKind::Response
    }

    pub fn label(&self) -> Option<&str> {
        self.label.as_deref()
    }

    pub fn into_request(self) -> Req {
        self.request
    }
}

impl<Req: fmt::Debug> WorkItem<Req> {
    /// `Debug` rendering of the request cut to at most `limit` characters.
    pub fn dump(&self, limit: usize) -> String {
        truncate_chars(format!("{:?}", self.request), limit)
    }
}

fn truncate_chars(mut text: String, limit: usize) -> String {
    if let Some((cut, _)) = text.char_indices().nth(limit) {
        text.truncate(cut);
    }
    text
}

/// Handler a work item is redelivered to.
///
/// Both paths receive the request by reference because the same request may be
/// sent several times.
#[async_trait]
pub trait DispatchTarget<Req: Sync>: Send + Sync {
    /// Response produced on the typed path.
    type Response: Send;

    /// Send a request whose handler returns nothing.
    async fn send_void(&self, request: &Req) -> Result<(), TargetError>;

    /// Send a request and wait for its response.
    async fn send_with_response(&self, request: &Req) -> Result<Self::Response, TargetError>;

    /// Name used in log records.
    fn name(&self) -> &str {
        std::any::type_name::<Self>()
    }
}

/// Adapts a `tower::Service` into a [`DispatchTarget`].
///
/// Each send clones the service and the request and drives a single call.
#[derive(Debug, Clone)]
pub struct ServiceTarget<S> {
    inner: S,
    name: Option<String>,
}

impl<S> ServiceTarget<S> {
    pub fn new(inner: S) -> Self {
        Self { inner, name: None }
    }

    /// Override the name reported in logs.
    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn get_ref(&self) -> &S {
        &self.inner
    }
}

#[async_trait]
impl<S, Req> DispatchTarget<Req> for ServiceTarget<S>
where
    Req: Clone + Send + Sync + 'static,
    S: Service<Req> + Clone + Send + Sync + 'static,
    S::Response: Send + 'static,
    S::Error: Into<TargetError> + Send + 'static,
    S::Future: Send + 'static,
{
    type Response = S::Response;

    async fn send_void(&self, request: &Req) -> Result<(), TargetError> {
        <Self as DispatchTarget<Req>>::send_with_response(self, request).await.map(|_| ())
    }

    async fn send_with_response(&self, request: &Req) -> Result<S::Response, TargetError> {
        self.inner.clone().oneshot(request.clone()).await.map_err(Into::into)
    }

    fn name(&self) -> &str {
        match &self.name {
            Some(name) => name.as_str(),
            None => std::any::type_name::<S>(),
        }
    }
}
