use bloques_lib::*;
use bloques_lib::grid::{NUM_DIMS,NUM_PORTS_PER_NODE};

/*
	Auxiliary functions shared by the allocation tests: building the
	emulated machine and walking or checking programmed wires.
*/

///The emulated four by four by four machine every scenario runs on.
pub fn allocator444() -> BlockAllocator
{
	let grid = Grid::new_emulated(GridDims::new([4,4,4])).unwrap();
	BlockAllocator::new(grid,LayoutConfig::default())
}

///A geometry request at a fixed origin.
pub fn request_at(geometry: [usize;3], conn_type: ConnType, start: Coord) -> BlockRequest
{
	BlockRequest::with_geometry(geometry,conn_type).starting_at(start)
}

///Every used internal wire must belong to an involutive pair.
pub fn assert_internal_symmetry(grid: &Grid)
{
	for midplane in grid.midplanes()
	{
		for dim in 0..NUM_DIMS
		{
			for port in 0..NUM_PORTS_PER_NODE
			{
				let wire = midplane.axis_switch[dim].int_wire[port];
				if wire.used
				{
					let partner = midplane.axis_switch[dim].int_wire[wire.port_tar];
					assert!(partner.used,
						"{:?} dim {} port {} pairs with an unused port",midplane.coord,dim,port);
					assert_eq!(partner.port_tar,port,
						"{:?} dim {} port {} is not an involutive pair",midplane.coord,dim,port);
				}
			}
		}
	}
}

///The result of following one programmed line from its origin.
pub struct LineWalk
{
	///Every midplane crossed, the origin first, in chain order.
	pub visited: Vec<Coord>,
	///Whether the chain returned to the origin endpoint (torus) rather
	///than stopping on a terminator elsewhere (mesh).
	pub closed: bool,
}

/**
Follows the programmed wires of the line through `origin` along `dim`:
out of the origin endpoint, across external wires, through each switch
as its internal pair dictates, until an endpoint is reached. Panics if
the chain is broken.
**/
pub fn walk_line(grid: &Grid, origin: Coord, dim: usize) -> LineWalk
{
	let start = grid.switch(origin,dim).int_wire[0];
	assert!(start.used,"the line origin {:?} must use its endpoint on dim {}",origin,dim);
	let mut out = start.port_tar;
	let mut visited = vec![origin];
	if out == 1
	{
		//the trivial extent one line
		return LineWalk{ visited, closed: true };
	}
	let mut node = origin;
	loop
	{
		let wire = grid.switch(node,dim).ext_wire[out];
		node = wire.node_tar;
		let pair = grid.switch(node,dim).int_wire[wire.port_tar];
		assert!(pair.used,"broken chain entering {:?} dim {} port {}",node,dim,wire.port_tar);
		if node == origin
		{
			assert_eq!(pair.port_tar,1,"the ring must close on the origin endpoint");
			return LineWalk{ visited, closed: true };
		}
		visited.push(node);
		if pair.port_tar == 1
		{
			return LineWalk{ visited, closed: false };
		}
		out = pair.port_tar;
		assert!(visited.len() <= grid.dims.size,"runaway walk on dim {}",dim);
	}
}

///The members of `block` on the line through `origin` along `dim`.
pub fn line_members(block: &Block, origin: Coord, dim: usize) -> Vec<Coord>
{
	block.midplanes.iter().copied()
		.filter(|c| (0..NUM_DIMS).all(|d| d==dim || c[d]==origin[d] ))
		.collect()
}
