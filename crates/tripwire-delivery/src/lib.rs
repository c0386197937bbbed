//! Task result callback delivery.
//!
//! Sends the verdict of a run back to the platform by PATCHing a JSON:API
//! `task-results` document to the callback URL carried in the request.
//!
//! # Architecture
//!
//! 1. **Encode** - [`TaskResult`](tripwire_core::TaskResult) is wrapped in
//!    its callback envelope
//! 2. **Send** - [`CallbackClient`] performs one authenticated PATCH
//! 3. **Classify** - the response is mapped to success or a categorized
//!    [`DeliveryError`]
//! 4. **Retry** - [`CallbackDispatcher`] consults the [`RetryPolicy`] and
//!    either waits and tries again or gives up
//!
//! Delivery runs inside the originating request; nothing is queued or
//! persisted.
//!
//! # Example
//!
//! ```no_run
//! use tripwire_core::{AccessToken, TaskResult};
//! use tripwire_delivery::{CallbackClient, CallbackDispatcher, DeliveryError, RetryPolicy};
//!
//! # async fn example(result: TaskResult) -> std::result::Result<(), DeliveryError> {
//! let dispatcher = CallbackDispatcher::new(CallbackClient::with_defaults()?, RetryPolicy::default());
//! let token = AccessToken::new("run-token");
//!
//! dispatcher
//!     .dispatch("https://app.terraform.io/api/v2/task-results/abc/callback", &token, &result)
//!     .await?;
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod client;
pub mod dispatcher;
pub mod error;
pub mod retry;

pub use client::{CallbackClient, CallbackRequest, CallbackResponse, ClientConfig};
pub use dispatcher::{CallbackDispatcher, DeliveryReceipt};
pub use error::{DeliveryError, ErrorCategory, Result};
pub use retry::{BackoffStrategy, RetryPolicy};

/// Default HTTP request timeout in seconds.
pub const DEFAULT_TIMEOUT_SECONDS: u64 = 30;
