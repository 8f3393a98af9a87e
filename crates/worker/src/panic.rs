use std::any::Any;

/// Renders a panic payload as text.
pub fn panic_message(payload: &(dyn Any + Send)) -> String {
	if let Some(msg) = payload.downcast_ref::<&'static str>() {
		(*msg).to_string()
	} else if let Some(msg) = payload.downcast_ref::<String>() {
		msg.clone()
	} else {
		"non-string panic payload".to_string()
	}
}

/// Extracts the panic message from a join error, or `None` when the task was cancelled.
pub fn join_error_panic_message(err: tokio::task::JoinError) -> Option<String> {
	if !err.is_panic() {
		return None;
	}
	let payload = err.into_panic();
	Some(panic_message(&*payload))
}

#[cfg(test)]
#[allow(clippy::disallowed_methods)]
mod tests {
	use super::*;

	#[tokio::test]
	async fn extracts_static_str_payload() {
		let handle = tokio::spawn(async { panic!("boom-str") });
		let err = handle.await.unwrap_err();
		let msg = join_error_panic_message(err).expect("should be a panic");
		assert!(msg.contains("boom-str"), "expected 'boom-str', got: {msg}");
	}

	#[tokio::test]
	async fn extracts_formatted_payload() {
		let handle = tokio::spawn(async { panic!("{}", String::from("boom-string")) });
		let err = handle.await.unwrap_err();
		let msg = join_error_panic_message(err).expect("should be a panic");
		assert!(msg.contains("boom-string"), "expected 'boom-string', got: {msg}");
	}

	#[tokio::test]
	async fn returns_none_for_cancellation() {
		let handle = tokio::spawn(async {
			tokio::time::sleep(std::time::Duration::from_secs(60)).await;
		});
		handle.abort();
		let err = handle.await.unwrap_err();
		assert!(join_error_panic_message(err).is_none(), "cancelled task should return None");
	}

	#[test]
	fn opaque_payload_is_labelled() {
		let payload: Box<dyn Any + Send> = Box::new(42u32);
		assert_eq!(panic_message(&*payload), "non-string panic payload");
	}
}
