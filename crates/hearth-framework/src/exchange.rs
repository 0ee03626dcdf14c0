//! The per-request working object handed to every hook.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::body::{BodyDecoder, ParseOptions};
use crate::error::{BodyError, HookError, HookResult, OffloadError};
use crate::hooks::Identity;
use crate::method::Verb;
use crate::offload::OffloadExecutor;
use hearth_core::{ConfigurationError, Instance, RequestContext};

// ============================================================================
// RawRequest
// ============================================================================

/// Transport-neutral inbound request.
#[derive(Debug, Clone)]
pub struct RawRequest {
    verb: Verb,
    path: String,
    headers: HashMap<String, String>,
    body: Vec<u8>,
}

impl RawRequest {
    pub fn new(verb: Verb, path: impl Into<String>) -> Self {
        Self {
            verb,
            path: path.into(),
            headers: HashMap::new(),
            body: Vec::new(),
        }
    }

    /// Header names are stored lowercased.
    pub fn header(mut self, name: impl AsRef<str>, value: impl Into<String>) -> Self {
        self.headers
            .insert(name.as_ref().to_ascii_lowercase(), value.into());
        self
    }

    pub fn body(mut self, body: impl Into<Vec<u8>>) -> Self {
        self.body = body.into();
        self
    }

    pub fn verb(&self) -> Verb {
        self.verb
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn get_header(&self, name: &str) -> Option<&str> {
        self.headers
            .get(&name.to_ascii_lowercase())
            .map(String::as_str)
    }

    pub fn raw_body(&self) -> &[u8] {
        &self.body
    }
}

// ============================================================================
// Response
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    status: u16,
    headers: BTreeMap<String, String>,
    body: Vec<u8>,
}

impl Default for Response {
    fn default() -> Self {
        Self {
            status: 200,
            headers: BTreeMap::new(),
            body: Vec::new(),
        }
    }
}

impl Response {
    pub fn status(&self) -> u16 {
        self.status
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .get(&name.to_ascii_lowercase())
            .map(String::as_str)
    }

    pub fn headers(&self) -> &BTreeMap<String, String> {
        &self.headers
    }

    pub fn body(&self) -> &[u8] {
        &self.body
    }

    /// Parses the body as JSON; handy in tests.
    pub fn json(&self) -> Result<Value, serde_json::Error> {
        serde_json::from_slice(&self.body)
    }
}

// ============================================================================
// Exchange
// ============================================================================

/// Everything one request carries through the hook chain.
#[derive(Debug)]
pub struct Exchange {
    endpoint: Arc<str>,
    request: RawRequest,
    body: BodyDecoder,
    response: Response,
    user: Option<Identity>,
    context: Option<RequestContext>,
    caches: Arc<HashMap<String, Instance>>,
    settings: Arc<Value>,
    offload: Option<OffloadExecutor>,
}

impl Exchange {
    /// A bare exchange with no context, caches or settings.
    pub fn new(request: RawRequest) -> Self {
        Self {
            endpoint: Arc::from(""),
            request,
            body: BodyDecoder::new(),
            response: Response::default(),
            user: None,
            context: None,
            caches: Arc::default(),
            settings: Arc::new(Value::Null),
            offload: None,
        }
    }

    pub(crate) fn for_route(
        endpoint: Arc<str>,
        request: RawRequest,
        caches: Arc<HashMap<String, Instance>>,
        settings: Arc<Value>,
        offload: Option<OffloadExecutor>,
    ) -> Self {
        Self {
            endpoint,
            caches,
            settings,
            offload,
            context: Some(RequestContext::new()),
            ..Self::new(request)
        }
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub fn request(&self) -> &RawRequest {
        &self.request
    }

    // ---- identity ----

    pub fn user(&self) -> Option<&Identity> {
        self.user.as_ref()
    }

    pub fn set_user(&mut self, user: Option<Identity>) {
        self.user = user;
    }

    // ---- dependencies ----

    pub fn context(&self) -> Option<&RequestContext> {
        self.context.as_ref()
    }

    pub fn context_mut(&mut self) -> Option<&mut RequestContext> {
        self.context.as_mut()
    }

    /// Replaces the request context; `None` makes injection fail.
    pub fn set_context(&mut self, context: Option<RequestContext>) {
        self.context = context;
    }

    /// Typed lookup of an injected dependency.
    pub fn dependency<T: Send + Sync + 'static>(&self, name: &str) -> HookResult<Arc<T>> {
        let context = self.context.as_ref().ok_or(ConfigurationError::MissingContext)?;
        Ok(context.get::<T>(name)?)
    }

    /// Typed lookup of a per-route cache.
    pub fn cache<T: Send + Sync + 'static>(&self, name: &str) -> Option<Arc<T>> {
        self.caches
            .get(name)
            .and_then(|instance| Arc::clone(instance).downcast::<T>().ok())
    }

    pub fn settings(&self) -> &Value {
        &self.settings
    }

    /// Looks up a dotted path such as `"mail.sender"` in the settings.
    pub fn setting(&self, path: &str) -> Option<&Value> {
        path.split('.')
            .try_fold(self.settings.as_ref(), |value, key| value.get(key))
    }

    // ---- payload ----

    /// Decodes the payload as JSON, at most once per request.
    ///
    /// A successful decode is memoized; failures are not, so a later call
    /// decodes again. With `fail_on_error` a failure becomes
    /// [`HookError::BadRequest`]; otherwise it yields `Ok(None)`.
    pub fn parsed_body(
        &mut self,
        options: ParseOptions,
        fail_on_error: bool,
    ) -> HookResult<Option<&Value>> {
        self.body
            .parse(self.request.raw_body(), options, fail_on_error)
    }

    /// Decodes the payload strictly and converts it into `T`.
    pub fn parsed_body_as<T: DeserializeOwned>(&mut self, options: ParseOptions) -> HookResult<T> {
        let value = self
            .parsed_body(options, true)?
            .cloned()
            .unwrap_or(Value::Null);
        serde_json::from_value(value).map_err(|e| HookError::bad_request(BodyError::Json(e)))
    }

    pub fn body_decoder(&self) -> &BodyDecoder {
        &self.body
    }

    // ---- response ----

    pub fn response(&self) -> &Response {
        &self.response
    }

    pub fn set_status(&mut self, status: u16) {
        self.response.status = status;
    }

    pub fn set_header(&mut self, name: impl AsRef<str>, value: impl Into<String>) {
        self.response
            .headers
            .insert(name.as_ref().to_ascii_lowercase(), value.into());
    }

    pub fn write(&mut self, bytes: impl AsRef<[u8]>) {
        self.response.body.extend_from_slice(bytes.as_ref());
    }

    /// Replaces the response with a JSON document.
    pub fn write_json<T: Serialize + ?Sized>(&mut self, status: u16, value: &T) -> HookResult<()> {
        let body = serde_json::to_vec(value).map_err(HookError::custom)?;
        self.response.status = status;
        self.response.body = body;
        self.set_header("content-type", "application/json");
        Ok(())
    }

    pub fn into_response(self) -> Response {
        self.response
    }

    // ---- blocking work ----

    pub fn offload(&self) -> Option<&OffloadExecutor> {
        self.offload.as_ref()
    }

    /// Runs blocking work on the route's bounded pool.
    pub async fn run_blocking<F, R>(&self, f: F) -> HookResult<R>
    where
        F: FnOnce() -> R + Send + 'static,
        R: Send + 'static,
    {
        let executor = self.offload.as_ref().ok_or(OffloadError::Unavailable)?;
        Ok(executor.run(f).await?)
    }
}
