/// Execution classes attached to every spawn for observability.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TaskClass {
	/// Long-lived coordinators such as supervisors.
	Control,
	/// Per-connection serial contexts.
	Session,
	/// Blocking I/O on dedicated threads.
	IoBlocking,
}

impl TaskClass {
	pub(crate) const fn as_str(self) -> &'static str {
		match self {
			Self::Control => "control",
			Self::Session => "session",
			Self::IoBlocking => "io_blocking",
		}
	}
}
