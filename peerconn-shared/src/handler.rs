use std::time::Instant;

/// Sans-io protocol surface.
///
/// A `Protocol` performs no I/O. The embedding runtime feeds inbound datagrams
/// with `handle_read`, drains outbound datagrams with `poll_write`, drains
/// typed events with `poll_event` and drives timers through
/// `poll_timeout`/`handle_timeout`.
pub trait Protocol<Rin, Win, Ein> {
    /// Associated read output message type
    type Rout;
    /// Associated write output message type
    type Wout;
    /// Associated event output type
    type Eout;
    /// Associated error type
    type Error;

    /// Handles an inbound message
    fn handle_read(&mut self, msg: Rin) -> Result<(), Self::Error>;

    /// Polls an inbound message for application consumption
    fn poll_read(&mut self) -> Option<Self::Rout>;

    /// Handles an outbound message from the application
    fn handle_write(&mut self, msg: Win) -> Result<(), Self::Error>;

    /// Polls an outbound message for the wire
    fn poll_write(&mut self) -> Option<Self::Wout>;

    /// Handles an application event
    fn handle_event(&mut self, _evt: Ein) -> Result<(), Self::Error> {
        Ok(())
    }

    /// Polls an event for application consumption
    fn poll_event(&mut self) -> Option<Self::Eout> {
        None
    }

    /// Handles a timeout; `now` is the current monotonic time
    fn handle_timeout(&mut self, _now: Instant) -> Result<(), Self::Error> {
        Ok(())
    }

    /// Polls the earliest deadline this protocol needs a `handle_timeout` call at
    fn poll_timeout(&mut self) -> Option<Instant> {
        None
    }

    /// Closes the protocol and releases resources
    fn close(&mut self) -> Result<(), Self::Error>;
}
