/*!

Block requests, the geometry planner and the committed block record.

A request names either an exact geometry or just a size; the planner
turns it into an ordered sequence of candidate shapes under the rotate
and elongate options. The allocator then tries each candidate against
the grid with the search in [`self::search`].

*/

pub(crate) mod search;

use itertools::Itertools;
use log::debug;

use crate::PassFlags;
use crate::config::LayoutConfig;
use crate::error::{Error,Result};
use crate::grid::{Coord,GridDims,NUM_DIMS,Y,Z};

///How the midplanes of a block are tied together along each dimension
///of extent above one: a closed ring, an open line, or not at all for
///the sub-midplane blocks.
#[derive(Clone,Copy,Debug,PartialEq,Eq)]
pub enum ConnType
{
	Torus,
	Mesh,
	///A single midplane carved up by the surrounding system; no
	///dimension wiring at all.
	Small,
}

///An allocation request. Either `geometry` or `size` should be given;
///`procs` alone also works and is rounded up to whole midplanes.
#[derive(Clone,Debug)]
pub struct BlockRequest
{
	pub geometry: Option<[usize;NUM_DIMS]>,
	pub size: Option<usize>,
	///Candidate origin, honored only when `start_req` is set.
	pub start: Option<Coord>,
	pub start_req: bool,
	pub conn_type: ConnType,
	///Also try the axis permutations of each candidate shape.
	pub rotate: bool,
	///Keep yielding differently proportioned shapes of the same size
	///after the first is exhausted.
	pub elongate: bool,
	///Axes on which this block must not cross foreign midplanes. When
	///absent the configured default applies.
	pub deny_pass: Option<PassFlags>,
	///Requested processor count, advisory, used to size the block when
	///neither geometry nor size is given.
	pub procs: Option<usize>,
	///Boot image identifiers. Opaque to the allocator.
	pub images: Vec<String>,
}

impl Default for BlockRequest
{
	fn default() -> BlockRequest
	{
		BlockRequest{
			geometry: None,
			size: None,
			start: None,
			start_req: false,
			conn_type: ConnType::Torus,
			rotate: false,
			elongate: false,
			deny_pass: None,
			procs: None,
			images: vec![],
		}
	}
}

impl BlockRequest
{
	pub fn with_geometry(geometry: [usize;NUM_DIMS], conn_type: ConnType) -> BlockRequest
	{
		BlockRequest{ geometry: Some(geometry), conn_type, ..BlockRequest::default() }
	}
	pub fn with_size(size: usize, conn_type: ConnType) -> BlockRequest
	{
		BlockRequest{ size: Some(size), conn_type, ..BlockRequest::default() }
	}
	///Fixes the origin of the allocation.
	pub fn starting_at(mut self, start: Coord) -> BlockRequest
	{
		self.start = Some(start);
		self.start_req = true;
		self
	}
}

///The artifact of a successful allocation.
#[derive(Clone,Debug)]
pub struct Block
{
	///Hostlist naming the committed midplanes.
	pub save_name: String,
	///Axes on which the block actually crosses foreign midplanes.
	pub passthroughs: PassFlags,
	///Shape rotations tried before this one fit. Diagnostic.
	pub rotate_count: u32,
	///Shapes consumed from the planner, the fitting one included.
	///Diagnostic.
	pub elongate_count: u32,
	///The committed midplanes, seed line first.
	pub midplanes: Vec<Coord>,
}

///Passthrough policy and findings of one placement attempt.
pub(crate) struct PassState
{
	pub deny: PassFlags,
	pub found: PassFlags,
	///Whether some otherwise valid wiring was rejected by the deny
	///bits. Distinguishes `PassthroughForbidden` from a plain `NoFit`.
	pub denied_hit: bool,
}

///One geometry to try, remembering which base shape produced it.
#[derive(Clone,Copy,Debug)]
pub(crate) struct Candidate
{
	pub geometry: [usize;NUM_DIMS],
	pub shape_index: usize,
}

///The fixed order of the axis permutations: the shape itself, the X-Z
///swap, the two cyclic rotations, and the two remaining swaps.
fn rotations(shape: [usize;NUM_DIMS]) -> [[usize;NUM_DIMS];6]
{
	let [a,b,c] = shape;
	[ [a,b,c], [c,b,a], [b,c,a], [c,a,b], [b,a,c], [a,c,b] ]
}

fn isqrt(n: usize) -> usize
{
	let mut r = 0;
	while (r+1)*(r+1) <= n { r += 1; }
	r
}

fn icbrt(n: usize) -> usize
{
	let mut r = 0;
	while (r+1)*(r+1)*(r+1) <= n { r += 1; }
	r
}

/**
Decomposes a size into candidate shapes, in a fixed order: the trivial
shape, a Y line, a square in the Y-Z plane, the factorization using
whole Y-Z planes, a greedy per-axis factor search that pulls the
largest usable divisor of the remainder into each axis in turn, and an
integer cube root. Shapes that repeat are deduplicated by the caller.
**/
fn derive_size_shapes(size: usize, sides: [usize;NUM_DIMS]) -> Vec<[usize;NUM_DIMS]>
{
	let mut shapes = Vec::new();
	if size == 1
	{
		shapes.push([1,1,1]);
		return shapes;
	}
	if size <= sides[Y]
	{
		shapes.push([1,size,1]);
	}
	let root = isqrt(size);
	if root*root == size && root <= sides[Y] && root <= sides[Z]
	{
		shapes.push([1,root,root]);
	}
	let plane = sides[Y]*sides[Z];
	if plane > 0 && size % plane == 0 && size/plane <= sides[0]
	{
		shapes.push([size/plane,sides[Y],sides[Z]]);
	}
	//Greedy fill, largest divisor first.
	{
		let mut geometry = [1,1,1];
		let mut remainder = size;
		let mut ok = true;
		for d in 0..NUM_DIMS
		{
			if remainder <= 1
			{
				break;
			}
			if remainder % sides[d] == 0 && remainder >= sides[d]
			{
				geometry[d] = sides[d];
				remainder /= sides[d];
			}
			else if remainder > sides[d]
			{
				match (2..=sides[d]).rev().find(|f| remainder % f == 0 )
				{
					Some(f) =>
					{
						geometry[d] = f;
						remainder /= f;
					}
					None =>
					{
						ok = false;
						break;
					}
				}
			}
			else
			{
				geometry[d] = remainder;
				remainder = 1;
			}
		}
		if ok && remainder == 1
		{
			shapes.push(geometry);
		}
	}
	let croot = icbrt(size);
	if croot*croot*croot == size && (0..NUM_DIMS).all(|d| croot <= sides[d] )
	{
		shapes.push([croot,croot,croot]);
	}
	shapes
}

fn push_rotations(list: &mut Vec<Candidate>, shape: [usize;NUM_DIMS], rotate: bool,
	shape_index: usize, sides: [usize;NUM_DIMS])
{
	let variants: Vec<[usize;NUM_DIMS]> = if rotate
	{
		rotations(shape).into_iter().unique().collect()
	}
	else
	{
		vec![shape]
	};
	for geometry in variants
	{
		if (0..NUM_DIMS).all(|d| geometry[d] <= sides[d] )
			&& !list.iter().any(|c| c.geometry == geometry )
		{
			debug!("adding geometry {:?}",geometry);
			list.push(Candidate{ geometry, shape_index });
		}
	}
}

/**
The ordered candidate geometries of a request. The exact geometry comes
first, then its permutations when rotating, then the shapes derived
from the size when elongating or when only a size was given. Size
driven shapes always rotate. Yields `GeometryInvalid` when nothing can
fit the grid.
**/
pub(crate) fn candidate_geometries(request: &BlockRequest, dims: &GridDims,
	config: &LayoutConfig) -> Result<Vec<Candidate>>
{
	let sides = dims.sides;
	let mut list: Vec<Candidate> = Vec::new();
	let mut shape_index = 0;
	if let Some(geometry) = request.geometry
	{
		for d in 0..NUM_DIMS
		{
			if geometry[d] < 1 || geometry[d] > sides[d]
			{
				return Err(Error::GeometryInvalid(format!(
					"axis {} of the requested geometry {:?} cannot be {} on a {:?} machine",
					d,geometry,geometry[d],sides)));
			}
		}
		push_rotations(&mut list,geometry,request.rotate,shape_index,sides);
		shape_index += 1;
	}
	if request.geometry.is_none() || request.elongate
	{
		let size = match (request.geometry,request.size,request.procs)
		{
			(Some(g),_,_) => g.iter().product(),
			(None,Some(n),_) => n,
			(None,None,Some(procs)) => config.midplanes_for_procs(procs),
			(None,None,None) => return Err(Error::GeometryInvalid(
				"the request carries neither geometry, size nor procs".to_string())),
		};
		if size == 0 || size > dims.size
		{
			return Err(Error::GeometryInvalid(format!(
				"size {} does not fit a machine of {} midplanes",size,dims.size)));
		}
		for shape in derive_size_shapes(size,sides)
		{
			push_rotations(&mut list,shape,true,shape_index,sides);
			shape_index += 1;
		}
	}
	if list.is_empty()
	{
		return Err(Error::GeometryInvalid(
			"no candidate shape fits the machine".to_string()));
	}
	Ok(list)
}
