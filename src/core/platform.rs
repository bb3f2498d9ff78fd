//! Provider capability interface and the OpenAI-compatible client behind it.
//!
//! Every supported provider speaks the OpenAI wire format, possibly through a
//! different path layout (Azure deployments) or auth header. [`ClientApi`]
//! picks the implementation for a [`ServiceProvider`] once, at construction.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{Datelike, Local};
use serde::de::DeserializeOwned;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::api::models::into_descriptors;
use crate::api::{ModelsResponse, SpeechRequest, SubscriptionResponse, UsageResponse};
use crate::core::access::{AccessPolicy, ServiceProvider};
use crate::core::builtin_models::find_builtin_provider;
use crate::core::chat_stream::{run_completion, run_stream, ChatEvent, StreamParams, StreamSession};
use crate::core::controller_pool::ControllerPool;
use crate::core::custom_providers::{find_selection, CustomProviderConfig};
use crate::core::error::ChatError;
use crate::core::headers::{HeaderResolver, HeaderSet};
use crate::core::images::{ImageResolver, InlineImageResolver};
use crate::core::message::RequestMessage;
use crate::core::model_family::ModelCapabilities;
use crate::core::model_table::{ModelDescriptor, ProviderRef};
use crate::core::params::{build_chat_payload, LlmConfig};
use crate::core::shaping::shape_messages;
use crate::utils::url::{azure_deployment_path, join_api_path, with_query};

pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(60);
pub const EXTENDED_TIMEOUT_FACTOR: u32 = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PathKind {
    Chat,
    Speech,
    ListModels,
    Usage,
    Subscription,
}

impl PathKind {
    pub fn openai_path(self) -> &'static str {
        match self {
            PathKind::Chat => "v1/chat/completions",
            PathKind::Speech => "v1/audio/speech",
            PathKind::ListModels => "v1/models",
            PathKind::Usage => "dashboard/billing/usage",
            PathKind::Subscription => "dashboard/billing/subscription",
        }
    }
}

/// One chat request.
#[derive(Debug, Clone)]
pub struct ChatOptions {
    pub session_id: String,
    pub message_id: String,
    pub messages: Vec<RequestMessage>,
    pub config: LlmConfig,
    /// Caller-supplied keys, comma-separated.
    pub api_key: Option<String>,
}

impl ChatOptions {
    pub fn new(
        session_id: impl Into<String>,
        message_id: impl Into<String>,
        messages: Vec<RequestMessage>,
        config: LlmConfig,
    ) -> Self {
        Self {
            session_id: session_id.into(),
            message_id: message_id.into(),
            messages,
            config,
            api_key: None,
        }
    }
}

/// A dispatched chat request. `events` yields updates and ends after the
/// single `Finish`.
pub struct ChatHandle {
    pub events: mpsc::UnboundedReceiver<ChatEvent>,
    pub cancel: CancellationToken,
    pub task: JoinHandle<()>,
}

#[derive(Debug, Clone, Default)]
pub struct SpeechOptions {
    pub model: String,
    pub input: String,
    pub voice: String,
    pub response_format: Option<String>,
    pub speed: Option<f32>,
}

/// Billing usage in USD.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Usage {
    pub used: f64,
    pub total: f64,
}

#[async_trait]
pub trait LlmApi: Send + Sync {
    /// Dispatches a chat request. Only configuration problems are returned as
    /// errors; everything after dispatch arrives on the handle's channel.
    async fn chat(&self, options: ChatOptions) -> Result<ChatHandle, ChatError>;
    async fn speech(&self, options: SpeechOptions) -> Result<Vec<u8>, ChatError>;
    async fn list_models(&self) -> Result<Vec<ModelDescriptor>, ChatError>;
    async fn usage(&self) -> Result<Usage, ChatError>;
}

/// Shared collaborators handed to every client.
#[derive(Clone)]
pub struct ApiContext {
    pub client: reqwest::Client,
    pub access: Arc<AccessPolicy>,
    pub custom_providers: Arc<[CustomProviderConfig]>,
    pub pool: ControllerPool,
    pub images: Arc<dyn ImageResolver>,
    pub request_timeout: Duration,
}

impl ApiContext {
    pub fn new(
        client: reqwest::Client,
        access: AccessPolicy,
        custom_providers: Vec<CustomProviderConfig>,
    ) -> Self {
        Self {
            images: Arc::new(InlineImageResolver::new(client.clone())),
            client,
            access: Arc::new(access),
            custom_providers: custom_providers.into(),
            pool: ControllerPool::new(),
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn with_pool(mut self, pool: ControllerPool) -> Self {
        self.pool = pool;
        self
    }

    pub fn with_images(mut self, images: Arc<dyn ImageResolver>) -> Self {
        self.images = images;
        self
    }

    /// Custom-provider models followed by the policy's model table.
    pub fn resolved_models(&self) -> Vec<ModelDescriptor> {
        self.access.resolved_models(&self.custom_providers)
    }

    pub fn find_custom_provider(&self, id: &str) -> Option<&CustomProviderConfig> {
        self.custom_providers
            .iter()
            .find(|provider| provider.id == id)
    }
}

/// OpenAI-compatible client.
pub struct ChatGptApi {
    provider: ServiceProvider,
    custom: Option<CustomProviderConfig>,
    ctx: ApiContext,
}

impl ChatGptApi {
    pub fn new(provider: ServiceProvider, ctx: ApiContext) -> Self {
        Self {
            provider,
            custom: None,
            ctx,
        }
    }

    pub fn for_custom_provider(custom: CustomProviderConfig, ctx: ApiContext) -> Self {
        Self {
            provider: ServiceProvider::CustomProvider,
            custom: Some(custom),
            ctx,
        }
    }

    fn is_azure(&self) -> bool {
        match &self.custom {
            Some(custom) => {
                ServiceProvider::from_provider_type(&custom.provider_type) == ServiceProvider::Azure
            }
            None => self.provider == ServiceProvider::Azure,
        }
    }

    fn base_url(&self) -> String {
        match &self.custom {
            Some(custom) => custom.base_url.trim().to_string(),
            None => self.ctx.access.base_url(self.provider),
        }
    }

    fn endpoint(&self, kind: PathKind) -> String {
        let paths = self.custom.as_ref().and_then(|custom| custom.paths.as_ref());
        let custom_path = paths.and_then(|paths| match kind {
            PathKind::Chat => paths.chat.clone(),
            PathKind::Speech => paths.speech.clone(),
            PathKind::ListModels => paths.models.clone(),
            PathKind::Usage | PathKind::Subscription => None,
        });
        custom_path.unwrap_or_else(|| kind.openai_path().to_string())
    }

    /// Full URL for a path kind. Incomplete provider setup is a config error.
    pub fn path(&self, kind: PathKind, model: &str) -> Result<String, ChatError> {
        let base = self.base_url();
        if base.is_empty() {
            return Err(ChatError::config(format!(
                "no endpoint URL is configured for {}",
                self.provider
            )));
        }
        let endpoint = self.endpoint(kind);

        if !self.is_azure() {
            return Ok(join_api_path(&base, &endpoint));
        }

        let version = self
            .ctx
            .access
            .azure_api_version()
            .ok_or_else(|| ChatError::config("Azure API version is not configured"))?;
        let path = match kind {
            PathKind::Chat | PathKind::Speech => {
                if model.is_empty() {
                    return Err(ChatError::config("Azure requests need a deployment name"));
                }
                azure_deployment_path(model, &endpoint, version)
            }
            PathKind::ListModels => {
                let endpoint = endpoint.trim_start_matches('/');
                with_query(endpoint.strip_prefix("v1/").unwrap_or(endpoint), "api-version", version)
            }
            PathKind::Usage | PathKind::Subscription => {
                return Err(ChatError::config(
                    "billing usage is not available for Azure deployments",
                ))
            }
        };
        Ok(join_api_path(&base, &path))
    }

    fn headers(&self, caller_api_key: Option<&str>) -> HeaderSet {
        let access = self.ctx.access.as_ref();
        match &self.custom {
            Some(custom) => {
                let keys = custom.usable_keys();
                let fallback = caller_api_key
                    .or_else(|| Some(custom.api_key.as_str()).filter(|key| !key.trim().is_empty()));
                HeaderResolver::new(ServiceProvider::CustomProvider, access)
                    .azure_dialect(self.is_azure())
                    .resolve(false, fallback, (!keys.is_empty()).then_some(keys.as_slice()))
            }
            None => HeaderResolver::new(self.provider, access).resolve(false, caller_api_key, None),
        }
    }

    fn provider_ref(&self) -> ProviderRef {
        match &self.custom {
            Some(custom) => custom.provider_ref(),
            None => find_builtin_provider(self.provider.id())
                .map(|builtin| builtin.provider_ref())
                .unwrap_or_else(|| {
                    let id = self.provider.id();
                    ProviderRef::new(id, id, id)
                }),
        }
    }

    fn capabilities(&self, config: &LlmConfig) -> ModelCapabilities {
        let models = self.ctx.resolved_models();
        let selection = if config.provider_name().is_empty() {
            config.model().to_string()
        } else {
            format!("{}@{}", config.model(), config.provider_name())
        };
        let extra = &self.ctx.access.server.vision_models;
        match find_selection(&models, &selection).or_else(|| find_selection(&models, config.model())) {
            Some(model) => ModelCapabilities::for_descriptor(model, extra),
            None => ModelCapabilities::for_model(config.model(), extra),
        }
    }

    fn timeout_for(&self, caps: &ModelCapabilities) -> Duration {
        if caps.extended_timeout {
            self.ctx.request_timeout * EXTENDED_TIMEOUT_FACTOR
        } else {
            self.ctx.request_timeout
        }
    }

    async fn get_json<T: DeserializeOwned>(&self, url: &str) -> Result<T, ChatError> {
        let mut request = self.ctx.client.get(url).timeout(self.ctx.request_timeout);
        for (name, value) in &self.headers(None) {
            request = request.header(name.as_str(), value.as_str());
        }
        let response = check_status(request.send().await?).await?;
        Ok(response.json::<T>().await?)
    }
}

async fn check_status(response: reqwest::Response) -> Result<reqwest::Response, ChatError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    if status == reqwest::StatusCode::UNAUTHORIZED {
        return Err(ChatError::Unauthorized);
    }
    let body = response.text().await.unwrap_or_default();
    Err(ChatError::Protocol {
        status: status.as_u16(),
        body,
    })
}

#[async_trait]
impl LlmApi for ChatGptApi {
    async fn chat(&self, options: ChatOptions) -> Result<ChatHandle, ChatError> {
        let ChatOptions {
            session_id,
            message_id,
            messages,
            config,
            api_key,
        } = options;

        let url = self.path(PathKind::Chat, config.model())?;
        let caps = self.capabilities(&config);
        let stream = config.stream();

        let cancel_token = CancellationToken::new();
        let generation = self
            .ctx
            .pool
            .track(&session_id, &message_id, cancel_token.clone());

        info!(model = config.model(), provider = %self.provider, stream, "dispatching chat request");
        let client = self.ctx.client.clone();
        let headers = self.headers(api_key.as_deref());
        let timeout = self.timeout_for(&caps);
        let images = Arc::clone(&self.ctx.images);
        let token = cancel_token.clone();

        let (tx, rx) = mpsc::unbounded_channel();
        let pool = self.ctx.pool.clone();
        let task = tokio::spawn(async move {
            // Shaping can download images and must stay cancellable.
            let shaped = tokio::select! {
                biased;
                _ = token.cancelled() => None,
                shaped = shape_messages(&messages, &caps, images.as_ref()) => Some(shaped),
            };
            match shaped {
                Some(shaped) => {
                    let params = StreamParams {
                        client,
                        url,
                        headers,
                        payload: build_chat_payload(&config, &caps, shaped),
                        cancel_token: token,
                        timeout,
                    };
                    if stream {
                        run_stream(params, tx).await;
                    } else {
                        run_completion(params, tx).await;
                    }
                }
                None => StreamSession::new(tx).abort(),
            }
            pool.remove_if(&session_id, &message_id, generation);
        });

        Ok(ChatHandle {
            events: rx,
            cancel: cancel_token,
            task,
        })
    }

    async fn speech(&self, options: SpeechOptions) -> Result<Vec<u8>, ChatError> {
        let url = self.path(PathKind::Speech, &options.model)?;
        let body = SpeechRequest {
            model: options.model,
            input: options.input,
            voice: options.voice,
            response_format: options.response_format,
            speed: options.speed,
        };
        let mut request = self
            .ctx
            .client
            .post(&url)
            .timeout(self.ctx.request_timeout)
            .json(&body);
        for (name, value) in &self.headers(None) {
            request = request.header(name.as_str(), value.as_str());
        }
        debug!(%url, "requesting speech");
        let response = check_status(request.send().await?).await?;
        Ok(response.bytes().await?.to_vec())
    }

    async fn list_models(&self) -> Result<Vec<ModelDescriptor>, ChatError> {
        let url = self.path(PathKind::ListModels, "")?;
        let response: ModelsResponse = self.get_json(&url).await?;
        Ok(into_descriptors(response, Arc::new(self.provider_ref())))
    }

    async fn usage(&self) -> Result<Usage, ChatError> {
        let today = Local::now().date_naive();
        let start = today.with_day(1).unwrap_or(today);
        let end = today.succ_opt().unwrap_or(today);
        let usage_url = with_query(
            &with_query(
                &self.path(PathKind::Usage, "")?,
                "start_date",
                &start.format("%Y-%m-%d").to_string(),
            ),
            "end_date",
            &end.format("%Y-%m-%d").to_string(),
        );
        let subscription_url = self.path(PathKind::Subscription, "")?;

        let usage: UsageResponse = self.get_json(&usage_url).await?;
        let subscription: SubscriptionResponse = self.get_json(&subscription_url).await?;
        Ok(Usage {
            used: (usage.total_usage / 100.0 * 100.0).round() / 100.0,
            total: subscription.hard_limit_usd,
        })
    }
}

/// The client for one provider.
pub struct ClientApi {
    provider: ServiceProvider,
    llm: Box<dyn LlmApi>,
}

impl ClientApi {
    pub fn new(provider: ServiceProvider, ctx: ApiContext) -> Self {
        let llm: Box<dyn LlmApi> = match provider {
            ServiceProvider::OpenAI
            | ServiceProvider::Azure
            | ServiceProvider::Google
            | ServiceProvider::Anthropic
            | ServiceProvider::DeepSeek
            | ServiceProvider::CustomProvider => Box::new(ChatGptApi::new(provider, ctx)),
        };
        Self { provider, llm }
    }

    pub fn for_custom_provider(custom: CustomProviderConfig, ctx: ApiContext) -> Self {
        Self {
            provider: ServiceProvider::CustomProvider,
            llm: Box::new(ChatGptApi::for_custom_provider(custom, ctx)),
        }
    }

    /// Client for a provider id: a custom provider's id, or a built-in one.
    pub fn for_provider_id(id: &str, ctx: ApiContext) -> Option<Self> {
        if let Some(custom) = ctx.find_custom_provider(id).cloned() {
            return Some(Self::for_custom_provider(custom, ctx));
        }
        let builtin = find_builtin_provider(id)?;
        let provider = ServiceProvider::from_provider_type(&builtin.provider_type);
        Some(Self::new(provider, ctx))
    }

    /// Client serving a resolved model, including its custom provider.
    pub fn for_model(model: &ModelDescriptor, ctx: ApiContext) -> Self {
        let provider = ServiceProvider::from_model(model);
        if provider == ServiceProvider::CustomProvider {
            let custom = model
                .provider_id()
                .and_then(|id| ctx.find_custom_provider(id))
                .cloned();
            if let Some(custom) = custom {
                return Self::for_custom_provider(custom, ctx);
            }
        }
        Self::new(provider, ctx)
    }

    pub fn provider(&self) -> ServiceProvider {
        self.provider
    }

    pub fn llm(&self) -> &dyn LlmApi {
        self.llm.as_ref()
    }
}
