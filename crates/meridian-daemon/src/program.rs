//! The two seams a subsystem plugs into the runtime.

use async_trait::async_trait;

use meridian_proto::{DaemonId, Request, Response, RpcError, StatusSnapshot, SubsystemInfo, UnitId};

/// What one hardware poll produced.
#[derive(Debug, Clone)]
pub struct ProgramTick {
    /// Subsystem state to publish in this tick's snapshot.
    pub info: SubsystemInfo,
    /// Units that could not be reached or reported a fault this tick.
    pub bad_units: Vec<UnitId>,
}

/// The loop-side half of a subsystem: owns the hardware.
///
/// `refresh` and `execute` run on the control-loop task only, so
/// implementations can hold hardware handles without locking. Failures must
/// be absorbed into `bad_units`, never panicked or propagated; a broken unit
/// is a status condition, not a reason to kill the loop.
#[async_trait]
pub trait ControlProgram: Send + 'static {
    /// Commands this subsystem executes, produced by its validator.
    type Command: Send + std::fmt::Debug + 'static;

    fn daemon_id(&self) -> DaemonId;

    /// Polls hardware and reports the resulting state.
    async fn refresh(&mut self) -> ProgramTick;

    /// Executes one queued command. At most one call per tick.
    async fn execute(&mut self, command: Self::Command);
}

/// What a validator decided about a request.
#[derive(Debug)]
pub enum Validated<C> {
    /// Accept the command; queue it for the loop and ack the caller.
    Queue { command: C, ack: String },
    /// Answer immediately without touching the loop (read-only requests).
    Reply(Response),
}

/// The RPC-side half of a subsystem: checks requests, never touches hardware.
///
/// Runs concurrently on connection tasks, validating against the latest
/// published snapshot. A command that passes validation can still fail at
/// execution time; the ack only promises the order was accepted.
pub trait CommandValidator: Send + Sync + 'static {
    type Command: Send + std::fmt::Debug + 'static;

    fn validate(
        &self,
        request: &Request,
        latest: Option<&StatusSnapshot>,
    ) -> Result<Validated<Self::Command>, RpcError>;
}
