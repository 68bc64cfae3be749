use async_trait::async_trait;
use web_push::{
    ContentEncoding, IsahcWebPushClient, PartialVapidSignatureBuilder, SubscriptionInfo,
    VapidSignatureBuilder, WebPushClient, WebPushError, WebPushMessageBuilder,
};

use crate::config::PushConfig;
use crate::db::models::PushSubscription;
use crate::error::{AppError, AppResult};
use crate::services::ports::{PushOutcome, PushPayload, PushTransport};

/// Messages older than this are dropped by the push service instead of delivered late.
const PUSH_TTL_SECONDS: u32 = 60 * 60;

/// Web Push sender signing requests with the server's VAPID key.
pub struct WebPushService {
    client: IsahcWebPushClient,
    signer: PartialVapidSignatureBuilder,
    subject: String,
}

impl WebPushService {
    /// Fails with a configuration error when the VAPID key is missing or unreadable.
    pub fn from_config(config: &PushConfig) -> AppResult<Self> {
        let pem = config
            .private_key_pem
            .as_deref()
            .ok_or_else(|| AppError::Config("VAPID_PRIVATE_KEY_PEM is not set".to_string()))?;
        if config.subject.trim().is_empty() {
            return Err(AppError::Config("VAPID_SUBJECT is empty".to_string()));
        }

        let signer = VapidSignatureBuilder::from_pem_no_sub(pem.as_bytes())
            .map_err(|e| AppError::Config(format!("Invalid VAPID private key: {}", e)))?;
        let client = IsahcWebPushClient::new()
            .map_err(|e| AppError::Push(format!("Failed to create push client: {}", e)))?;

        Ok(Self {
            client,
            signer,
            subject: config.subject.clone(),
        })
    }

    async fn deliver(
        &self,
        subscription: &PushSubscription,
        body: &[u8],
    ) -> Result<(), WebPushError> {
        let info = SubscriptionInfo::new(
            subscription.endpoint.as_str(),
            subscription.p256dh.as_str(),
            subscription.auth.as_str(),
        );

        let mut signature = self.signer.clone().add_sub_info(&info);
        signature.add_claim("sub", self.subject.as_str());
        let signature = signature.build()?;

        let mut builder = WebPushMessageBuilder::new(&info);
        builder.set_payload(ContentEncoding::Aes128Gcm, body);
        builder.set_ttl(PUSH_TTL_SECONDS);
        builder.set_vapid_signature(signature);

        self.client.send(builder.build()?).await
    }
}

/// 404/410 from the push service mean the browser dropped the subscription.
fn classify(result: Result<(), WebPushError>) -> PushOutcome {
    match result {
        Ok(()) => PushOutcome::Delivered,
        Err(WebPushError::EndpointNotValid { .. }) | Err(WebPushError::EndpointNotFound { .. }) => {
            PushOutcome::Gone
        }
        Err(e) => PushOutcome::Failed(e.to_string()),
    }
}

#[async_trait]
impl PushTransport for WebPushService {
    async fn send(&self, subscription: &PushSubscription, payload: &PushPayload) -> PushOutcome {
        let body = match serde_json::to_vec(payload) {
            Ok(body) => body,
            Err(e) => return PushOutcome::Failed(format!("payload encoding: {}", e)),
        };
        let outcome = classify(self.deliver(subscription, &body).await);
        tracing::debug!("Push to subscription {}: {:?}", subscription.id, outcome);
        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(pem: Option<&str>) -> PushConfig {
        PushConfig {
            private_key_pem: pem.map(str::to_string),
            public_key: None,
            subject: "mailto:ops@example.com".to_string(),
        }
    }

    #[test]
    fn missing_key_is_a_config_error() {
        assert!(matches!(
            WebPushService::from_config(&config(None)),
            Err(AppError::Config(_))
        ));
    }

    #[test]
    fn garbage_key_is_a_config_error() {
        assert!(matches!(
            WebPushService::from_config(&config(Some("not a pem"))),
            Err(AppError::Config(_))
        ));
    }

    #[test]
    fn success_is_delivered() {
        assert_eq!(classify(Ok(())), PushOutcome::Delivered);
    }
}
