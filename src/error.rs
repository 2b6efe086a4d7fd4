/*!

Error kinds surfaced by the allocator entry points.

Every failure is local to the call that produced it. A failed call rolls
back whatever partial wiring it made, so the grid after an `Err` is
exactly the grid before the call.

*/

use thiserror::Error;

///The reasons an allocator call can fail. Each carries a human-oriented
///detail string; callers should match on the variant, not the text.
#[derive(Error,Debug,Clone,PartialEq,Eq)]
pub enum Error
{
	///An axis of the requested geometry is 0 or exceeds the grid in that
	///axis, or a size request admits no shape inside the grid at all.
	#[error("invalid geometry: {0}")]
	GeometryInvalid(String),
	///A fixed start coordinate falls outside the grid or cannot satisfy
	///the geometry at that origin.
	#[error("start out of range: {0}")]
	StartOutOfRange(String),
	///No candidate geometry admits a valid wiring anywhere in the grid
	///under the current state and policy.
	#[error("no fit: {0}")]
	NoFit(String),
	///A valid wiring exists but requires a passthrough on an axis the
	///caller forbade.
	#[error("passthrough forbidden: {0}")]
	PassthroughForbidden(String),
	///An inventory import or node list merge would double-use a port or
	///a midplane.
	#[error("conflict: {0}")]
	Conflict(String),
	///An id could not be mapped to coordinates or vice versa.
	#[error("lookup failed: {0}")]
	LookupFailed(String),
}

pub type Result<T> = std::result::Result<T,Error>;
