/*!

The virtual mirror of the machine: a dense 3D array of midplane records,
each carrying one routing switch per dimension. Allocations are planned
against this mirror and only then pushed to the real fabric, so two
blocks that would double-use a wire are rejected here instead of on the
hardware.

*/

pub mod wiring;

use std::fmt;

use log::debug;

///Number of dimensions of the coordinate grid.
pub const NUM_DIMS: usize = 3;
///Ports on every per-dimension switch.
pub const NUM_PORTS_PER_NODE: usize = 6;

pub const X: usize = 0;
pub const Y: usize = 1;
pub const Z: usize = 2;

///A midplane position, `[x,y,z]`.
pub type Coord = [usize; NUM_DIMS];

///A Cartesian box of midplanes of arbitrary per-axis sides.
#[derive(Clone,Debug,PartialEq,Eq)]
pub struct GridDims
{
	pub sides: [usize; NUM_DIMS],
	pub size: usize,
}

impl GridDims
{
	pub fn new(sides: [usize; NUM_DIMS]) -> GridDims
	{
		GridDims{
			sides,
			size: sides.iter().product(),
		}
	}
	///From a dense index to coordinates. Panics outside the grid.
	pub fn unpack(&self, mut index: usize) -> Coord
	{
		if index >= self.size
		{
			panic!("index={} is greater than the size of the grid={}",index,self.size);
		}
		let mut r = [0; NUM_DIMS];
		for (i,side) in self.sides.iter().enumerate()
		{
			r[i] = index % side;
			index /= side;
		}
		r
	}
	///From coordinates to a dense index. Panics outside the grid.
	pub fn pack(&self, coord: Coord) -> usize
	{
		for (c,s) in coord.iter().zip(self.sides.iter())
		{
			if *c >= *s
			{
				panic!("coordinate {} is greater than the side {}",c,s);
			}
		}
		let mut r = 0;
		let mut stride = 1;
		for (i,side) in self.sides.iter().enumerate()
		{
			r += coord[i]*stride;
			stride *= side;
		}
		r
	}
	pub fn contains(&self, coord: Coord) -> bool
	{
		coord.iter().zip(self.sides.iter()).all(|(c,s)| c<s )
	}
	///The neighbour one step along `dim`, wrapping at the side.
	pub fn wrap_next(&self, coord: Coord, dim: usize) -> Coord
	{
		let mut r = coord;
		r[dim] = (coord[dim]+1) % self.sides[dim];
		r
	}
}

///Whether a midplane can take part in a new allocation.
#[derive(Clone,Copy,Debug,PartialEq,Eq)]
pub enum Used
{
	///Available.
	Free,
	///Part of a committed block.
	Allocated,
	///Down or drained by the administrator.
	Unusable,
	///Transiently excluded while the caller evaluates an allocation.
	Removed,
}

///Coarse midplane state as reported by the node table.
#[derive(Clone,Copy,Debug,PartialEq,Eq)]
pub enum NodeState
{
	Idle,
	Drain,
	Down,
	///Marker used while building a transient exclusion set.
	End,
}

///Routing of a signal arriving on a port to the port it leaves on
///within the same switch.
#[derive(Clone,Copy,Debug,PartialEq,Eq)]
pub struct InternalWire
{
	pub used: bool,
	pub port_tar: usize,
}

///The cable from a port to a port of a neighbour switch of the same
///dimension. A port with no cable points back at its own switch.
#[derive(Clone,Copy,Debug,PartialEq,Eq)]
pub struct ExternalWire
{
	pub node_tar: Coord,
	pub port_tar: usize,
}

/**
A per-dimension routing element with a fixed set of ports.

Ports 0 and 1 are the endpoints of the dimension, used to terminate a
mesh line or close a torus back on its origin. Ports 2 and 5 are the
through pair that steps to the next midplane. Ports 3 and 4 are the
split pair carrying the fold cables of the long dimension.
**/
#[derive(Clone,Debug,PartialEq,Eq)]
pub struct AxisSwitch
{
	pub int_wire: [InternalWire; NUM_PORTS_PER_NODE],
	pub ext_wire: [ExternalWire; NUM_PORTS_PER_NODE],
}

impl AxisSwitch
{
	fn new(coord: Coord) -> AxisSwitch
	{
		AxisSwitch{
			int_wire: std::array::from_fn(|p| InternalWire{ used:false, port_tar:p }),
			ext_wire: std::array::from_fn(|p| ExternalWire{ node_tar:coord, port_tar:p }),
		}
	}
}

///One node of the grid. The atomic unit of allocation.
#[derive(Clone,Debug,PartialEq,Eq)]
pub struct Midplane
{
	pub coord: Coord,
	pub used: Used,
	pub state: NodeState,
	///Display color for the operator view. 7 when unassigned.
	pub color: u8,
	///Display letter for the operator view. `.` when unassigned, `#` when down.
	pub letter: char,
	///Index of this midplane in the caller-visible node table.
	pub index: usize,
	pub axis_switch: [AxisSwitch; NUM_DIMS],
}

impl Midplane
{
	///Reinitializes wires and, unless the midplane is kept down, its
	///availability. On the Y and Z switches the split ports are born
	///used: only the long dimension carries fold cables.
	fn refresh(&mut self, track_down_nodes: bool)
	{
		let down = self.state==NodeState::Down || self.state==NodeState::Drain;
		if !down || !track_down_nodes
		{
			self.used = Used::Free;
			self.color = 7;
			self.letter = '.';
		}
		for dim in 0..NUM_DIMS
		{
			for port in 0..NUM_PORTS_PER_NODE
			{
				let w = &mut self.axis_switch[dim].int_wire[port];
				w.used = dim!=X && (port==3 || port==4);
				w.port_tar = port;
			}
		}
	}
}

/**
The dense grid of midplanes plus the per-axis sides. External wires are
installed once by a [`wiring::WireSource`]; internal wires are mutated
only through allocation, removal and reset.
**/
#[derive(Clone,Debug,PartialEq,Eq)]
pub struct Grid
{
	pub dims: GridDims,
	grid: Vec<Midplane>,
}

impl Grid
{
	///An unwired grid. Use [`wiring::EmulatedWires`] or an inventory
	///import to populate the external wires.
	pub fn new(dims: GridDims) -> Grid
	{
		let mut grid = Vec::with_capacity(dims.size);
		for index in 0..dims.size
		{
			let coord = dims.unpack(index);
			let mut midplane = Midplane{
				coord,
				used: Used::Free,
				state: NodeState::Idle,
				color: 7,
				letter: '.',
				index,
				axis_switch: std::array::from_fn(|_| AxisSwitch::new(coord)),
			};
			midplane.refresh(false);
			grid.push(midplane);
		}
		Grid{ dims, grid }
	}
	///A grid with the emulated cable layout already installed.
	pub fn new_emulated(dims: GridDims) -> crate::error::Result<Grid>
	{
		use wiring::WireSource;
		let mut grid = Grid::new(dims);
		wiring::EmulatedWires.install(&mut grid)?;
		Ok(grid)
	}
	pub fn midplane(&self, coord: Coord) -> &Midplane
	{
		&self.grid[self.dims.pack(coord)]
	}
	pub fn midplane_mut(&mut self, coord: Coord) -> &mut Midplane
	{
		let index = self.dims.pack(coord);
		&mut self.grid[index]
	}
	pub fn switch(&self, coord: Coord, dim: usize) -> &AxisSwitch
	{
		&self.midplane(coord).axis_switch[dim]
	}
	pub fn switch_mut(&mut self, coord: Coord, dim: usize) -> &mut AxisSwitch
	{
		&mut self.midplane_mut(coord).axis_switch[dim]
	}
	pub fn midplanes(&self) -> impl Iterator<Item=&Midplane>
	{
		self.grid.iter()
	}
	///Returns every non-down midplane to the free state and clears every
	///internal wire. With `track_down_nodes` the down and drained ones
	///keep their unusable mark.
	pub fn reset(&mut self, track_down_nodes: bool)
	{
		for midplane in self.grid.iter_mut()
		{
			midplane.refresh(track_down_nodes);
		}
	}
	///Records the state reported by the node table and derives the
	///availability from it.
	pub fn update_node_state(&mut self, coord: Coord, state: NodeState)
	{
		let midplane = self.midplane_mut(coord);
		debug!("new state of {:?} is {:?}",coord,state);
		midplane.state = state;
		if state==NodeState::Down || state==NodeState::Drain
		{
			midplane.used = Used::Unusable;
			midplane.letter = '#';
			midplane.color = 0;
		}
		else
		{
			midplane.used = Used::Free;
			if midplane.letter=='#'
			{
				midplane.letter = '.';
				midplane.color = 7;
			}
		}
	}
	/**
	Whether a midplane can join a block needing `x_size` midplanes
	along the long dimension. Beyond the availability flag, a switch
	whose split and through exit (ports 3 and 5) are both consumed has
	no wire left to route another line across it.
	**/
	pub fn node_used(&self, coord: Coord, x_size: usize) -> bool
	{
		let midplane = self.midplane(coord);
		if midplane.used != Used::Free
		{
			return true;
		}
		if x_size > 1
		{
			let switch = &midplane.axis_switch[X];
			if switch.int_wire[3].used && switch.int_wire[5].used
			{
				return true;
			}
		}
		false
	}
	/**
	Installs the external cable between `(source,port_src)` and
	`(target,port_tar)` on dimension `dim`, updating both endpoint
	records so the reverse mapping always holds.
	**/
	pub fn switch_config(&mut self, source: Coord, target: Coord, dim: usize, port_src: usize, port_tar: usize)
	{
		{
			let wire = &mut self.switch_mut(source,dim).ext_wire[port_src];
			wire.node_tar = target;
			wire.port_tar = port_tar;
		}
		{
			let wire = &mut self.switch_mut(target,dim).ext_wire[port_tar];
			wire.node_tar = source;
			wire.port_tar = port_src;
		}
	}
	///Sets the internal pair `a<->b` used on both ends.
	pub(crate) fn connect_int(&mut self, coord: Coord, dim: usize, a: usize, b: usize)
	{
		let switch = self.switch_mut(coord,dim);
		switch.int_wire[a].used = true;
		switch.int_wire[a].port_tar = b;
		switch.int_wire[b].used = true;
		switch.int_wire[b].port_tar = a;
	}
	///Clears one internal wire entry back to its idle self-pointing state.
	pub(crate) fn clear_int(&mut self, coord: Coord, dim: usize, port: usize)
	{
		let switch = self.switch_mut(coord,dim);
		switch.int_wire[port].used = false;
		switch.int_wire[port].port_tar = port;
	}
}

impl fmt::Display for Grid
{
	///One line per midplane with its letter, for the operator view.
	fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result
	{
		for z in 0..self.dims.sides[Z]
		{
			for y in 0..self.dims.sides[Y]
			{
				for x in 0..self.dims.sides[X]
				{
					write!(f,"{}",self.midplane([x,y,z]).letter)?;
				}
				writeln!(f)?;
			}
			writeln!(f)?;
		}
		Ok(())
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn pack_unpack()
	{
		let dims = GridDims::new([4,3,2]);
		assert_eq!(dims.size,24);
		for index in 0..dims.size
		{
			assert_eq!(dims.pack(dims.unpack(index)),index);
		}
		assert_eq!(dims.unpack(0),[0,0,0]);
		assert_eq!(dims.unpack(1),[1,0,0]);
		assert_eq!(dims.unpack(4),[0,1,0]);
		assert!(dims.contains([3,2,1]));
		assert!(!dims.contains([4,0,0]));
	}

	#[test]
	#[should_panic]
	fn pack_rejects_outside()
	{
		let dims = GridDims::new([4,4,4]);
		dims.pack([4,0,0]);
	}

	#[test]
	fn fresh_split_ports()
	{
		//Only the long dimension has fold cables, so Y and Z switches are
		//born with their split pair consumed.
		let grid = Grid::new(GridDims::new([2,2,2]));
		let midplane = grid.midplane([1,1,0]);
		for dim in [Y,Z]
		{
			assert!(midplane.axis_switch[dim].int_wire[3].used);
			assert!(midplane.axis_switch[dim].int_wire[4].used);
			assert!(!midplane.axis_switch[dim].int_wire[2].used);
		}
		for port in 0..NUM_PORTS_PER_NODE
		{
			assert!(!midplane.axis_switch[X].int_wire[port].used);
		}
	}

	#[test]
	fn node_used_full_switch()
	{
		let mut grid = Grid::new(GridDims::new([4,1,1]));
		assert!(!grid.node_used([2,0,0],4));
		grid.connect_int([2,0,0],X,3,5);
		assert!(grid.node_used([2,0,0],4));
		//A single-midplane block does not need X transit.
		assert!(!grid.node_used([2,0,0],1));
	}

	#[test]
	fn reset_is_idempotent()
	{
		let mut grid = Grid::new_emulated(GridDims::new([4,4,4])).unwrap();
		grid.connect_int([1,2,3],Y,0,1);
		grid.midplane_mut([1,2,3]).used = Used::Allocated;
		grid.reset(false);
		let once = grid.clone();
		grid.reset(false);
		assert_eq!(grid,once);
	}

	#[test]
	fn reset_tracks_down_nodes()
	{
		let mut grid = Grid::new(GridDims::new([2,2,2]));
		grid.update_node_state([0,1,0],NodeState::Down);
		grid.reset(true);
		assert_eq!(grid.midplane([0,1,0]).used,Used::Unusable);
		grid.reset(false);
		assert_eq!(grid.midplane([0,1,0]).used,Used::Free);
	}
}
