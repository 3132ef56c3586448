//! Cold storage is a named but unimplemented collaborator: the original
//! source references an archive path for persisting log entries past the
//! live-viewer window but never wires it up. This trait is the boundary a
//! real archive would implement; until one exists, [`NullArchive`] is the
//! only implementation and every call is a no-op.

use hearth_protocol::LogEntry;

pub trait Archive: Send + Sync {
    fn store(&self, entry: &LogEntry);
}

#[derive(Clone, Default)]
pub struct NullArchive;

impl Archive for NullArchive {
    fn store(&self, _entry: &LogEntry) {}
}
