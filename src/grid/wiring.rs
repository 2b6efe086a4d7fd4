/*!

Population of the external wires: either an emulated cable layout for a
grid of known sides, or an import from a hardware inventory (see the
`inventory` module for the latter).

Every dimension carries the plain through ring, port 2 of each switch to
port 5 of the next midplane, wrapping at the side. The long dimension
additionally carries the split cables on ports 3 and 4 that fold the
ring; those layouts are hand-routed per machine size, so they live in a
table keyed by the X side rather than in code.

*/

use log::debug;

use super::{Grid,X,NUM_DIMS,NUM_PORTS_PER_NODE};
use crate::error::{Error,Result};

///A split cable of the long dimension: from port `port_src` of the
///switch at `x` to port `port_tar` of the switch at `target_x`, for
///every `(y,z)` plane.
#[derive(Clone,Copy,Debug)]
pub struct FoldCable
{
	pub x: usize,
	pub port_src: usize,
	pub target_x: usize,
	pub port_tar: usize,
}

const fn cable(x: usize, port_src: usize, target_x: usize, port_tar: usize) -> FoldCable
{
	FoldCable{ x, port_src, target_x, port_tar }
}

/**
The split cable layouts of the machine sizes that were ever routed.
Small rings up to four midplanes have no fold at all. The thirteen-wide
layout is asymmetric: its low midplanes pair with the high ones through
both split ports.

An X side absent from this table is not a layout anyone cabled, and the
emulated wiring refuses it instead of guessing.
**/
pub const X_FOLD_TABLES: &[(usize, &[FoldCable])] = &[
	(1, &[]),
	(2, &[]),
	(3, &[]),
	(4, &[]),
	(5, &[
		cable(1,4,4,3),
		cable(3,4,2,3),
		cable(4,4,1,3),
	]),
	(8, &[
		cable(1,4,0,3),
		cable(2,4,7,3),
		cable(3,4,6,3),
		cable(5,4,4,3),
		cable(6,4,3,3),
		cable(7,4,2,3),
	]),
	(13, &[
		cable(1,3,12,4),
		cable(12,3,1,4),
		cable(2,3,11,4),
		cable(11,3,2,4),
		cable(3,3,10,4),
		cable(10,3,3,4),
		cable(4,3,9,4),
		cable(9,3,4,4),
		cable(5,3,8,4),
		cable(8,3,5,4),
		cable(7,4,6,3),
	]),
];

pub fn x_fold_table(side: usize) -> Option<&'static [FoldCable]>
{
	X_FOLD_TABLES.iter().find(|(s,_)| *s==side ).map(|(_,t)| *t )
}

///Something that can populate the external wires of a fresh grid.
pub trait WireSource
{
	fn install(&self, grid: &mut Grid) -> Result<()>;
}

///The emulated cable layout: self-loops everywhere, the through rings,
///and the fold table of the X side.
pub struct EmulatedWires;

impl WireSource for EmulatedWires
{
	fn install(&self, grid: &mut Grid) -> Result<()>
	{
		let sides = grid.dims.sides;
		let fold = x_fold_table(sides[X]).ok_or_else(||
			Error::NoFit(format!("no split cable layout is known for an X side of {}",sides[X]))
		)?;
		//Idle ports point back at themselves.
		for index in 0..grid.dims.size
		{
			let coord = grid.dims.unpack(index);
			for dim in 0..NUM_DIMS
			{
				for port in 0..NUM_PORTS_PER_NODE
				{
					grid.switch_config(coord,coord,dim,port,port);
				}
			}
		}
		//The through ring of every dimension.
		for index in 0..grid.dims.size
		{
			let coord = grid.dims.unpack(index);
			for dim in 0..NUM_DIMS
			{
				let target = grid.dims.wrap_next(coord,dim);
				grid.switch_config(coord,target,dim,2,5);
			}
		}
		//The fold cables of the long dimension, replicated on every (y,z).
		for y in 0..sides[1]
		{
			for z in 0..sides[2]
			{
				for c in fold
				{
					debug!("fold cable {} port {} to {} port {} at y={} z={}",
						c.x,c.port_src,c.target_x,c.port_tar,y,z);
					grid.switch_config([c.x,y,z],[c.target_x,y,z],X,c.port_src,c.port_tar);
				}
			}
		}
		Ok(())
	}
}
