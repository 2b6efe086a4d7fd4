/*!
bloques-lib
=====

This crate provides the block allocator of a 3D-torus machine as a
library: given a requested cuboid of midplanes and a connection type it
finds a contiguous embedding in the midplane grid and programs the
per-dimension switches of every affected midplane, so that each
requested dimension forms a closed ring (torus) or an open line (mesh).
The allocator works against a virtual mirror of the fabric, which lets
it reject overlapping allocations, honor per-axis passthrough policy,
and roll a failed attempt back without touching the machine.

# Usage

This crate is `bloques-lib`. To use it add `bloques-lib` to your
dependencies in your project's `Cargo.toml`.

```toml
[dependencies]
bloques-lib = "0.3"
```

A minimal session over an emulated four by four by four machine:

```ignore
use bloques_lib::{BlockAllocator,BlockRequest,ConnType,Grid,GridDims,LayoutConfig};

let grid = Grid::new_emulated(GridDims::new([4,4,4]))?;
let mut allocator = BlockAllocator::new(grid,LayoutConfig::default());
let request = BlockRequest::with_geometry([2,2,2],ConnType::Torus);
let block = allocator.allocate_block(&request)?;
println!("got {}",block.save_name);
allocator.remove_block(&block)?;
```

# Configuration

The layout keys of the site configuration file are read into a
[`config::LayoutConfig`]; see that module for the accepted keys. The
`DenyPassthrough` axis list becomes the default policy of every request
that does not carry its own.

# Entry points

All entry points take `&mut self`: the caller is expected to hold the
controller's write lock on the resource graph, and the allocator has no
internal parallelism nor suspension points. Failures are rolled back
before returning, so the grid after an `Err` is the grid from before
the call.

*/

pub mod error;
pub mod config;
pub mod hostlist;
pub mod grid;
pub mod inventory;
pub mod layout;

use bitflags::bitflags;
use log::debug;

pub use crate::config::LayoutConfig;
pub use crate::error::{Error,Result};
pub use crate::grid::{Coord,Grid,GridDims,Used,NodeState};
pub use crate::layout::{Block,BlockRequest,ConnType};

use crate::grid::{X,NUM_DIMS};
use crate::layout::{search,PassState,candidate_geometries};

bitflags! {
	///Per-axis passthrough bits: the deny half carries policy into a
	///request, the found half reports what an allocation actually used.
	#[derive(Clone,Copy,Debug,PartialEq,Eq,Default)]
	pub struct PassFlags: u16 {
		const DENY_X = 0x0001;
		const DENY_Y = 0x0002;
		const DENY_Z = 0x0004;
		const FOUND_X = 0x0008;
		const FOUND_Y = 0x0010;
		const FOUND_Z = 0x0020;
	}
}

impl PassFlags
{
	pub fn deny_of(dim: usize) -> PassFlags
	{
		[PassFlags::DENY_X,PassFlags::DENY_Y,PassFlags::DENY_Z][dim]
	}
	pub fn found_of(dim: usize) -> PassFlags
	{
		[PassFlags::FOUND_X,PassFlags::FOUND_Y,PassFlags::FOUND_Z][dim]
	}
	///The axes with found bits set, as `X,Y` style text.
	pub fn found_string(&self) -> String
	{
		let mut axes = Vec::new();
		if self.contains(PassFlags::FOUND_X) { axes.push("X"); }
		if self.contains(PassFlags::FOUND_Y) { axes.push("Y"); }
		if self.contains(PassFlags::FOUND_Z) { axes.push("Z"); }
		axes.join(",")
	}
}

///Letters assigned to blocks for the operator view, recycled when
///exhausted.
const BLOCK_LETTERS: &[u8;62] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789";
///Display colors, skipping the one reserved for down midplanes.
const BLOCK_COLORS: [u8;6] = [1,2,3,5,6,7];

/**
The allocator over one grid. Owns the virtual mirror of the fabric, the
layout configuration and the running count of display colors.
**/
pub struct BlockAllocator
{
	grid: Grid,
	config: LayoutConfig,
	color_count: usize,
}

impl BlockAllocator
{
	pub fn new(grid: Grid, config: LayoutConfig) -> BlockAllocator
	{
		BlockAllocator{ grid, config, color_count: 0 }
	}
	pub fn grid(&self) -> &Grid
	{
		&self.grid
	}
	///Mutable access for inventory imports and node state updates.
	pub fn grid_mut(&mut self) -> &mut Grid
	{
		&mut self.grid
	}
	pub fn config(&self) -> &LayoutConfig
	{
		&self.config
	}
	/**
	Tries to allocate a block for the request. Candidate geometries are
	taken from the planner in order; for each, every admissible origin
	is tried until one admits a full wiring. On success the midplanes
	are committed, colored and named; on any failure the grid is left
	exactly as it was.
	**/
	pub fn allocate_block(&mut self, request: &BlockRequest) -> Result<Block>
	{
		let deny = request.deny_pass.unwrap_or(self.config.deny_passthrough);
		let candidates = candidate_geometries(request,&self.grid.dims,&self.config)?;
		let fixed_start = if request.start_req
		{
			let start = request.start.ok_or_else(||
				Error::StartOutOfRange("start_req is set but no start was given".to_string()) )?;
			if !self.grid.dims.contains(start)
			{
				return Err(Error::StartOutOfRange(format!(
					"{:?} lies outside a {:?} machine",start,self.grid.dims.sides)));
			}
			Some(start)
		}
		else
		{
			None
		};
		let sides = self.grid.dims.sides;
		let mut denied_hit = false;
		let mut any_origin = false;
		let mut tried: u32 = 0;
		for candidate in candidates.iter()
		{
			let geometry = candidate.geometry;
			tried += 1;
			debug!("finding {:?} try {}",geometry,tried);
			let origins: Vec<Coord> = match fixed_start
			{
				Some(start) =>
				{
					if (0..NUM_DIMS).any(|d| start[d]+geometry[d] > sides[d] )
					{
						continue;
					}
					vec![start]
				}
				None =>
				{
					let mut origins = Vec::new();
					for x in 0..=sides[0]-geometry[0]
					{
						for y in 0..=sides[1]-geometry[1]
						{
							for z in 0..=sides[2]-geometry[2]
							{
								origins.push([x,y,z]);
							}
						}
					}
					origins
				}
			};
			any_origin = any_origin || !origins.is_empty();
			for origin in origins
			{
				if self.grid.node_used(origin,geometry[X])
				{
					continue;
				}
				debug!("trying {:?} at {:?}",geometry,origin);
				let mut pass = PassState{ deny, found: PassFlags::empty(), denied_hit: false };
				if let Some(midplanes) = search::place_block(&mut self.grid,origin,geometry,
					request.conn_type,&mut pass)
				{
					let save_name = self.commit(&midplanes);
					debug!("name = {}",save_name);
					return Ok(Block{
						save_name,
						passthroughs: pass.found,
						rotate_count: tried-1,
						elongate_count: candidate.shape_index as u32 + 1,
						midplanes,
					});
				}
				denied_hit = denied_hit || pass.denied_hit;
			}
		}
		if let (Some(start),false) = (fixed_start,any_origin)
		{
			return Err(Error::StartOutOfRange(format!(
				"no candidate geometry fits at {:?}",start)));
		}
		if denied_hit
		{
			Err(Error::PassthroughForbidden(
				"every admissible wiring crosses a denied axis".to_string()))
		}
		else
		{
			Err(Error::NoFit("no candidate geometry admits a wiring".to_string()))
		}
	}
	///Marks the found midplanes as allocated, hands out the display
	///letter and color, and renders the hostlist name.
	fn commit(&mut self, midplanes: &[Coord]) -> String
	{
		let name = hostlist::render(midplanes);
		let letter = BLOCK_LETTERS[self.color_count % BLOCK_LETTERS.len()] as char;
		let color = BLOCK_COLORS[self.color_count % BLOCK_COLORS.len()];
		let mut assigned = false;
		for &coord in midplanes
		{
			let midplane = self.grid.midplane_mut(coord);
			midplane.used = Used::Allocated;
			if midplane.letter == '.'
			{
				midplane.letter = letter;
				midplane.color = color;
				assigned = true;
			}
		}
		if assigned
		{
			self.color_count += 1;
		}
		name
	}
	/**
	Tears a committed block down: clears the programmed paths of its
	midplanes, passthrough switches included, and frees their color and
	letter. The inverse of [`allocate_block`](Self::allocate_block)
	restricted to that block.
	**/
	pub fn remove_block(&mut self, block: &Block) -> Result<()>
	{
		for &coord in block.midplanes.iter()
		{
			if !self.grid.dims.contains(coord)
			{
				return Err(Error::LookupFailed(format!(
					"{:?} lies outside a {:?} machine",coord,self.grid.dims.sides)));
			}
		}
		for &coord in block.midplanes.iter()
		{
			{
				let midplane = self.grid.midplane_mut(coord);
				midplane.used = Used::Free;
				midplane.color = 7;
				midplane.letter = '.';
			}
			for dim in 0..NUM_DIMS
			{
				if self.grid.switch(coord,dim).int_wire[0].used
				{
					search::reset_the_path(&mut self.grid,coord,0,1,dim);
				}
			}
		}
		self.color_count = self.color_count.saturating_sub(1);
		Ok(())
	}
	///Returns the whole grid to the free state, keeping down and
	///drained midplanes out when asked to.
	pub fn reset(&mut self, track_down_nodes: bool)
	{
		self.grid.reset(track_down_nodes);
		self.color_count = 0;
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn allocator() -> BlockAllocator
	{
		let grid = Grid::new_emulated(GridDims::new([4,4,4])).unwrap();
		BlockAllocator::new(grid,LayoutConfig::default())
	}

	#[test]
	fn single_midplane_block()
	{
		let mut allocator = allocator();
		let request = BlockRequest::with_geometry([1,1,1],ConnType::Torus).starting_at([0,0,0]);
		let block = allocator.allocate_block(&request).unwrap();
		assert_eq!(block.midplanes,vec![[0,0,0]]);
		assert_eq!(block.save_name,"000");
		assert!(block.passthroughs.is_empty());
		for dim in 0..NUM_DIMS
		{
			let switch = allocator.grid().switch([0,0,0],dim);
			assert!(switch.int_wire[0].used);
			assert_eq!(switch.int_wire[0].port_tar,1);
			assert_eq!(switch.int_wire[1].port_tar,0);
		}
	}

	#[test]
	fn colors_and_letters_rotate()
	{
		let mut allocator = allocator();
		let mut letters = Vec::new();
		for x in 0..3
		{
			let request = BlockRequest::with_geometry([1,1,1],ConnType::Small).starting_at([x,0,0]);
			allocator.allocate_block(&request).unwrap();
			letters.push(allocator.grid().midplane([x,0,0]).letter);
		}
		assert_eq!(letters,vec!['A','B','C']);
	}

	#[test]
	fn small_blocks_have_no_wires()
	{
		let mut allocator = allocator();
		let request = BlockRequest::with_geometry([1,1,1],ConnType::Small).starting_at([1,2,3]);
		let block = allocator.allocate_block(&request).unwrap();
		assert_eq!(block.save_name,"123");
		assert_eq!(allocator.grid().midplane([1,2,3]).used,Used::Allocated);
		for dim in 0..NUM_DIMS
		{
			assert!(!allocator.grid().switch([1,2,3],dim).int_wire[0].used);
		}
	}

	#[test]
	fn start_out_of_range()
	{
		let mut allocator = allocator();
		let request = BlockRequest::with_geometry([1,1,1],ConnType::Torus).starting_at([4,0,0]);
		assert!(matches!(allocator.allocate_block(&request),Err(Error::StartOutOfRange(_))));
		let request = BlockRequest::with_geometry([3,1,1],ConnType::Torus).starting_at([2,0,0]);
		assert!(matches!(allocator.allocate_block(&request),Err(Error::StartOutOfRange(_))));
	}

	#[test]
	fn found_string_renders()
	{
		assert_eq!((PassFlags::FOUND_X | PassFlags::FOUND_Z).found_string(),"X,Z");
		assert_eq!(PassFlags::empty().found_string(),"");
	}
}
