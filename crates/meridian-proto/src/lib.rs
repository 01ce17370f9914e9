//! Wire protocol types for meridian daemon communication.
//!
//! Every hardware daemon in the observatory speaks the same framed
//! request/response protocol over TCP or Unix sockets, serialised with rkyv.
//! The protocol carries:
//!
//! - Common verbs (status, info, shutdown, prod)
//! - Typed per-subsystem commands (exposures, focuser moves, filter changes,
//!   cover motion, power switching)
//! - Full-frame image readouts, which is why the frame size limit is large
//!
//! # Wire Format
//!
//! All messages use a common envelope format with an 8-byte frame header:
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────┐
//! │              Frame Header (8 bytes, fixed)               │
//! ├──────────────┬──────────────┬────────────────────────────┤
//! │  Version (2) │ Msg Type (2) │    Payload Length (4)      │
//! ├──────────────┴──────────────┴────────────────────────────┤
//! │                 rkyv-serialised Envelope                  │
//! └─────────────────────────────────────────────────────────┘
//! ```

pub mod codec;
mod envelope;
mod error;
mod request;
mod response;
mod status;
mod types;

pub use codec::{Codec, FrameHeader, MessageType, CURRENT_VERSION, FRAME_HEADER_SIZE, MAX_MESSAGE_SIZE};
pub use envelope::{current_timestamp_ns, Envelope, EnvelopeHeader};
pub use error::ProtocolError;
pub use request::{
    ExposureRequest, FilterAssignment, FocuserTarget, FrameType, ImageType, Request, Window,
};
pub use response::{FrameData, Response, RpcError, UnitHeaders};
pub use status::{
    CameraInfo, CameraUnitInfo, CoverPosition, CoversInfo, CoversUnitInfo, DaemonStatus,
    ExposureState, FilterWheelInfo, FilterWheelUnitInfo, FocuserInfo, FocuserUnitInfo, OutletInfo,
    PowerInfo, StatusSnapshot, SubsystemInfo,
};
pub use types::{CorrelationId, DaemonId, UnitId};

/// Protocol version constants.
pub mod version {
    /// Current protocol version.
    pub const CURRENT: u16 = 1;

    /// Minimum supported protocol version.
    pub const MIN_SUPPORTED: u16 = 1;
}
