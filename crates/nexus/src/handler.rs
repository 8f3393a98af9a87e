use async_trait::async_trait;

use crate::context::SessionContext;
use crate::error::BoxError;

/// Business callbacks for one session.
///
/// All three run on the session's serial context, one at a time and never
/// concurrently with each other. A panic in any of them tears down only
/// this session.
#[async_trait]
pub trait SessionHandler: Send + 'static {
	async fn on_connect(&mut self, _ctx: &SessionContext) {}

	/// Called once per frame, in arrival order. The next frame is not read
	/// until this returns.
	async fn on_message(&mut self, ctx: &SessionContext, payload: &[u8]);

	async fn on_disconnect(&mut self, _ctx: &SessionContext) {}
}

/// Produces a fresh [`SessionHandler`] for every accepted connection.
pub trait SessionHandlerFactory: Send + Sync + 'static {
	fn provide(&self, identity: &str) -> Result<Box<dyn SessionHandler>, BoxError>;
}

impl<F> SessionHandlerFactory for F
where
	F: Fn(&str) -> Result<Box<dyn SessionHandler>, BoxError> + Send + Sync + 'static,
{
	fn provide(&self, identity: &str) -> Result<Box<dyn SessionHandler>, BoxError> {
		self(identity)
	}
}
