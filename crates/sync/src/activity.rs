// Editing activity flags.
//
// `editing`: a persistable change happened and the idle window has not yet
// elapsed since. `saving`: a remote write is in flight. `pending_remote` and
// `sync_on_stop` record that a local save produced changes the remote tier has
// not seen.

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ActivityTracker {
    editing: bool,
    saving: bool,
    pending_remote: bool,
    sync_on_stop: bool,
}

impl ActivityTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// A local save ran.
    pub fn mark_local_save(&mut self) {
        self.editing = true;
        self.pending_remote = true;
        self.sync_on_stop = true;
    }

    /// The idle window elapsed with no further edits.
    pub fn mark_idle(&mut self) {
        self.editing = false;
    }

    /// Claim the remote writer. Returns false if a write is already in flight.
    pub fn begin_save(&mut self) -> bool {
        if self.saving {
            return false;
        }
        self.saving = true;
        true
    }

    /// Release the remote writer. Called on every completion path.
    pub fn end_save(&mut self) {
        self.saving = false;
    }

    pub fn clear_pending(&mut self) {
        self.pending_remote = false;
        self.sync_on_stop = false;
    }

    pub fn is_editing(&self) -> bool {
        self.editing
    }

    pub fn is_saving(&self) -> bool {
        self.saving
    }

    pub fn has_pending_remote(&self) -> bool {
        self.pending_remote
    }

    pub fn should_sync_on_stop(&self) -> bool {
        self.sync_on_stop
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_idle() {
        let activity = ActivityTracker::new();
        assert!(!activity.is_editing());
        assert!(!activity.is_saving());
        assert!(!activity.has_pending_remote());
        assert!(!activity.should_sync_on_stop());
    }

    #[test]
    fn local_save_sets_editing_and_pending() {
        let mut activity = ActivityTracker::new();
        activity.mark_local_save();
        assert!(activity.is_editing());
        assert!(activity.has_pending_remote());
        assert!(activity.should_sync_on_stop());

        activity.mark_idle();
        assert!(!activity.is_editing());
        assert!(activity.has_pending_remote());

        activity.clear_pending();
        assert!(!activity.has_pending_remote());
        assert!(!activity.should_sync_on_stop());
    }

    #[test]
    fn saving_is_exclusive() {
        let mut activity = ActivityTracker::new();
        assert!(activity.begin_save());
        assert!(!activity.begin_save());
        activity.end_save();
        assert!(activity.begin_save());
    }
}
