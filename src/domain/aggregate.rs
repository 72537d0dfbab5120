use uuid::Uuid;

// ============================================================================
// Aggregate Root Pattern
// ============================================================================
//
// Key Principles:
// 1. Commands are validated against the current state before anything changes
// 2. Events describe facts that have already happened
// 3. State only changes by applying events
// 4. An empty event list is a valid answer (idempotent no-op)
//
// Persistence is row-based: the service applies the events in memory and
// writes the resulting snapshot with a compare-and-set on the status it
// started from.
//
// ============================================================================

/// Generic Aggregate trait - Order and Payment implement this
pub trait Aggregate: Sized + Send + Sync {
    type Event;
    type Command;
    type Error;

    /// Apply an event to update state
    fn apply_event(&mut self, event: &Self::Event);

    /// Handle command and emit events (business logic)
    fn handle_command(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error>;

    /// Get aggregate ID
    fn aggregate_id(&self) -> Uuid;

    /// Handle a command and apply whatever it emits.
    ///
    /// The aggregate is untouched when the command is rejected.
    fn execute(&mut self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        let events = self.handle_command(command)?;
        for event in &events {
            self.apply_event(event);
        }
        Ok(events)
    }
}
