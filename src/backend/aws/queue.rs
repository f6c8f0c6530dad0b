//! [`AwsQueueClient`]: the durable-queue contract over `aws-sdk-sqs`.

use std::time::Duration;

use async_trait::async_trait;
use aws_sdk_sqs::types::{MessageSystemAttributeName, QueueAttributeName};
use aws_sdk_sqs::Client;
use tracing::warn;

use super::with_timeout;
use crate::error::{MirrorError, Result};
use crate::model::{QueueDepth, RawMessage, Receipt};
use crate::ports::QueueClient;

/// Bounded retry count for a `change_message_visibility` call that fails
/// for a reason other than "receipt handle is gone" — an ordinary
/// transient/throttling error (§4.4/§7 distinguish this from a genuine
/// lost lease, which is not retried).
const EXTEND_RETRIES: u32 = 3;
const EXTEND_RETRY_BACKOFF: Duration = Duration::from_millis(200);

/// Long-polls a single SQS queue. One instance is constructed per Worker
/// (or Dispatcher, for the depth probe) and reused for its lifetime (§5
/// "Shared resources").
pub struct AwsQueueClient {
    client: Client,
    queue_url: String,
}

impl AwsQueueClient {
    pub fn new(client: Client, queue_url: impl Into<String>) -> Self {
        Self {
            client,
            queue_url: queue_url.into(),
        }
    }
}

#[async_trait]
impl QueueClient for AwsQueueClient {
    async fn receive(&self, wait_seconds: u32, max_msgs: u32) -> Result<Vec<RawMessage>> {
        with_timeout(
            async {
                let resp = self
                    .client
                    .receive_message()
                    .queue_url(&self.queue_url)
                    .wait_time_seconds(wait_seconds.min(20) as i32)
                    .max_number_of_messages(max_msgs.clamp(1, 10) as i32)
                    .attribute_names(MessageSystemAttributeName::ApproximateReceiveCount)
                    .send()
                    .await
                    .map_err(|err| MirrorError::QueueUnavailable(err.to_string()))?;

                Ok(resp
                    .messages()
                    .iter()
                    .map(|message| {
                        let attempts = message
                            .attributes()
                            .and_then(|attrs| attrs.get(&MessageSystemAttributeName::ApproximateReceiveCount))
                            .and_then(|v| v.parse().ok())
                            .unwrap_or(1);
                        RawMessage {
                            body: message.body().unwrap_or_default().to_string(),
                            receipt: Receipt(message.receipt_handle().unwrap_or_default().to_string()),
                            attempts,
                        }
                    })
                    .collect())
            },
            || MirrorError::QueueUnavailable("receive_message timed out".to_string()),
        )
        .await
    }

    async fn ack(&self, receipt: &Receipt) -> Result<()> {
        with_timeout(
            async {
                self.client
                    .delete_message()
                    .queue_url(&self.queue_url)
                    .receipt_handle(&receipt.0)
                    .send()
                    .await
                    .map_err(|err| MirrorError::QueueUnavailable(err.to_string()))?;
                Ok(())
            },
            || MirrorError::QueueUnavailable("delete_message timed out".to_string()),
        )
        .await
    }

    async fn extend(&self, receipt: &Receipt, seconds: u32) -> Result<()> {
        let mut attempt = 0u32;
        loop {
            let outcome = with_timeout(
                async {
                    self.client
                        .change_message_visibility()
                        .queue_url(&self.queue_url)
                        .receipt_handle(&receipt.0)
                        .visibility_timeout(seconds as i32)
                        .send()
                        .await
                        .map(|_| ())
                        .map_err(|err| {
                            let service_err = err.into_service_error();
                            if service_err.is_receipt_handle_is_invalid() || service_err.is_message_not_inflight() {
                                MirrorError::LeaseLost(format!("{receipt}: {service_err}"))
                            } else {
                                MirrorError::QueueUnavailable(service_err.to_string())
                            }
                        })
                },
                || MirrorError::QueueUnavailable(format!("{receipt}: change_message_visibility timed out")),
            )
            .await;

            match outcome {
                Ok(()) => return Ok(()),
                Err(err @ MirrorError::LeaseLost(_)) => return Err(err),
                Err(err) if attempt < EXTEND_RETRIES => {
                    attempt += 1;
                    warn!(receipt = %receipt, attempt, error = %err, "transient extend failure, retrying");
                    tokio::time::sleep(EXTEND_RETRY_BACKOFF).await;
                }
                Err(err) => return Err(err),
            }
        }
    }

    async fn depth(&self) -> Result<QueueDepth> {
        with_timeout(
            async {
                let resp = self
                    .client
                    .get_queue_attributes()
                    .queue_url(&self.queue_url)
                    .attribute_names(QueueAttributeName::ApproximateNumberOfMessages)
                    .attribute_names(QueueAttributeName::ApproximateNumberOfMessagesNotVisible)
                    .send()
                    .await
                    .map_err(|err| MirrorError::QueueUnavailable(err.to_string()))?;

                let attrs = resp.attributes();
                let visible = attrs
                    .and_then(|a| a.get(&QueueAttributeName::ApproximateNumberOfMessages))
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(0);
                let in_flight = attrs
                    .and_then(|a| a.get(&QueueAttributeName::ApproximateNumberOfMessagesNotVisible))
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(0);

                Ok(QueueDepth { visible, in_flight })
            },
            || MirrorError::QueueUnavailable("get_queue_attributes timed out".to_string()),
        )
        .await
    }
}
