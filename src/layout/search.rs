/*!

The wiring search that turns a candidate geometry into programmed
switches: the long-dimension line finder with its two port preference
orders, the bounded closer that ties a torus line back to its origin,
the fill that replicates the line across the short dimensions, and the
path walkers used to copy and to tear down programmed lines.

Every internal wire set while building a candidate is recorded in a
journal; any failure rewinds the journal, so an attempt that does not
commit leaves the grid exactly as it found it.

*/

use log::debug;

use crate::PassFlags;
use crate::grid::{Coord,Grid,Used,X,Y,Z,NUM_DIMS};
use crate::layout::{ConnType,PassState};

///Prune bound of the closure searches. No sane return path on the
///fabrics this models comes anywhere near it.
const BEST_COUNT_INIT: usize = 20;

///The two port preference orders of the line finder. The first leads
///with the split port and finds the folded runs; the second leads with
///the through port and may jump over committed blocks.
#[derive(Clone,Copy,Debug,PartialEq,Eq)]
pub(crate) enum Algo
{
	First,
	Second,
}

impl Algo
{
	fn ports(self) -> [usize;2]
	{
		match self
		{
			Algo::First => [4,2],
			Algo::Second => [2,4],
		}
	}
}

/**
Log of the internal wires set while building one candidate block.
Rollback clears them in reverse order, restoring the grid byte for
byte. Dropped without rollback on commit.
**/
#[derive(Default)]
pub(crate) struct WireJournal
{
	marks: Vec<(Coord,usize,usize)>,
}

impl WireJournal
{
	pub fn checkpoint(&self) -> usize
	{
		self.marks.len()
	}
	///Sets the internal pair `a<->b` if both ports are free, recording
	///it for rollback. Refuses used ports.
	pub fn connect(&mut self, grid: &mut Grid, coord: Coord, dim: usize, a: usize, b: usize) -> bool
	{
		let switch = grid.switch(coord,dim);
		if switch.int_wire[a].used || switch.int_wire[b].used
		{
			debug!("refusing to overwrite {:?} dim {} ports {} {}",coord,dim,a,b);
			return false;
		}
		grid.connect_int(coord,dim,a,b);
		self.marks.push((coord,dim,a));
		self.marks.push((coord,dim,b));
		true
	}
	pub fn rollback_to(&mut self, grid: &mut Grid, checkpoint: usize)
	{
		while self.marks.len() > checkpoint
		{
			let (coord,dim,port) = self.marks.pop().expect("rewinding past the start of the journal");
			grid.clear_int(coord,dim,port);
		}
	}
}

///A switch to program on a closure or jump path: enter on `in_port`,
///leave on `out_port`.
#[derive(Clone,Copy,Debug)]
pub(crate) struct PathStep
{
	pub coord: Coord,
	pub dim: usize,
	pub in_port: usize,
	pub out_port: usize,
}

/**
Bounded depth-first search over switch ports, keeping the best path
seen so far. One instance per closure attempt; the scratch state is
never shared between attempts.
**/
pub(crate) struct ClosureSearch
{
	path: Vec<PathStep>,
	best: Option<Vec<PathStep>>,
	best_count: usize,
	landing: Option<(Coord,usize)>,
}

impl ClosureSearch
{
	pub fn new() -> ClosureSearch
	{
		ClosureSearch{
			path: Vec::new(),
			best: None,
			best_count: BEST_COUNT_INIT,
			landing: None,
		}
	}
	/**
	Searches a return path from the open end of a line back to `start`,
	through free ports of unused switches only, never revisiting a
	midplane already on the path. Records the shortest closure found;
	longer branches are pruned against it.
	**/
	pub fn finish_torus(&mut self, grid: &Grid, node: Coord, dim: usize, in_port: usize,
		count: usize, start: Coord)
	{
		if count >= self.best_count
		{
			return;
		}
		if node == start && count > 0
		{
			//The terminating port of the origin must be free.
			if !grid.switch(node,dim).int_wire[1].used
			{
				self.path.push(PathStep{ coord:node, dim, in_port, out_port:1 });
				self.best = Some(self.path.clone());
				self.best_count = count;
				self.path.pop();
			}
			return;
		}
		let ports = if in_port==0 || in_port==3 || in_port==5 { [4,2] } else { [3,5] };
		for port in ports
		{
			if grid.switch(node,dim).int_wire[port].used
			{
				continue;
			}
			let wire = grid.switch(node,dim).ext_wire[port];
			if wire.node_tar == node
			{
				continue;
			}
			if grid.switch(wire.node_tar,dim).int_wire[wire.port_tar].used
			{
				continue;
			}
			if self.path.iter().any(|s| s.coord == wire.node_tar )
			{
				continue;
			}
			self.path.push(PathStep{ coord:node, dim, in_port, out_port:port });
			self.finish_torus(grid,wire.node_tar,dim,wire.port_tar,count+1,start);
			self.path.pop();
		}
	}
	/**
	Follows the through ring looking for the next free midplane that is
	not yet part of the line, recording the transit switches crossed on
	the way. Used by the second preference order to skip over committed
	blocks.
	**/
	pub fn find_next_free(&mut self, grid: &Grid, node: Coord, dim: usize, in_port: usize,
		count: usize, line: &[Coord])
	{
		if count >= self.best_count
		{
			return;
		}
		if count > 0 && !line.contains(&node) && grid.midplane(node).used == Used::Free
		{
			debug!("found the next free midplane at {:?}",node);
			self.best = Some(self.path.clone());
			self.best_count = count;
			self.landing = Some((node,in_port));
			return;
		}
		let switch = grid.switch(node,dim);
		if switch.int_wire[2].used || switch.int_wire[in_port].used
		{
			return;
		}
		let wire = switch.ext_wire[2];
		if wire.node_tar == node
		{
			return;
		}
		if grid.switch(wire.node_tar,dim).int_wire[wire.port_tar].used
		{
			return;
		}
		if self.path.iter().any(|s| s.coord == wire.node_tar )
		{
			return;
		}
		self.path.push(PathStep{ coord:node, dim, in_port, out_port:2 });
		self.find_next_free(grid,wire.node_tar,dim,wire.port_tar,count+1,line);
		self.path.pop();
	}
	pub fn into_best(self) -> Option<Vec<PathStep>>
	{
		self.best
	}
	pub fn into_jump(self) -> Option<(Vec<PathStep>,Coord,usize)>
	{
		match (self.best,self.landing)
		{
			(Some(path),Some((coord,port))) => Some((path,coord,port)),
			_ => None,
		}
	}
}

/**
Finds and programs a whole block at `start`: the long-dimension line,
then the replication and wiring of the short dimensions. On `None`
every wire of the attempt has been rewound.
**/
pub(crate) fn place_block(grid: &mut Grid, start: Coord, geometry: [usize;NUM_DIMS],
	conn: ConnType, pass: &mut PassState) -> Option<Vec<Coord>>
{
	let mut results = vec![start];
	if conn == ConnType::Small
	{
		return Some(results);
	}
	let mut journal = WireJournal::default();
	let mut found = find_x_path(grid,&mut journal,&mut results,start,0,start,
		geometry[X],1,conn,Algo::First,pass);
	if !found
	{
		debug!("trying the less efficient order");
		journal.rollback_to(grid,0);
		results.truncate(1);
		found = find_x_path(grid,&mut journal,&mut results,start,0,start,
			geometry[X],1,conn,Algo::Second,pass);
	}
	if !found
	{
		journal.rollback_to(grid,0);
		return None;
	}
	let line = results.clone();
	if !fill_in_coords(grid,&mut journal,&mut results,&line,start,geometry,conn,pass)
	{
		journal.rollback_to(grid,0);
		return None;
	}
	Some(results)
}

/**
Recursively picks the midplanes of the long-dimension line. `node` was
entered through `in_port` (0 stands for the seed endpoint); on success
unwinding programs `in_port` to the chosen exit on every switch, the
seed keeping port 0 and the far end terminating per the connection
type.
**/
fn find_x_path(grid: &mut Grid, journal: &mut WireJournal, results: &mut Vec<Coord>,
	node: Coord, in_port: usize, start: Coord, x_size: usize, found: usize,
	conn: ConnType, algo: Algo, pass: &mut PassState) -> bool
{
	if x_size == 1
	{
		return journal.connect(grid,node,X,0,1);
	}
	if found == x_size
	{
		return close_x_line(grid,journal,results,node,in_port,start,conn,pass);
	}
	for port in algo.ports()
	{
		if grid.switch(node,X).int_wire[port].used
		{
			continue;
		}
		let wire = grid.switch(node,X).ext_wire[port];
		if wire.node_tar == node
		{
			//the port points at itself
			continue;
		}
		if wire.node_tar == start
		{
			//back at the seed before the line is complete
			continue;
		}
		if results.contains(&wire.node_tar)
		{
			debug!("already been to {:?}",wire.node_tar);
			continue;
		}
		if grid.node_used(wire.node_tar,x_size)
		{
			continue;
		}
		if grid.switch(wire.node_tar,X).int_wire[wire.port_tar].used
		{
			continue;
		}
		let checkpoint = journal.checkpoint();
		let kept = results.len();
		results.push(wire.node_tar);
		debug!("found {} looking at {:?} port {} going to {:?} port {}",
			found,node,port,wire.node_tar,wire.port_tar);
		if find_x_path(grid,journal,results,wire.node_tar,wire.port_tar,start,
			x_size,found+1,conn,algo,pass)
			&& journal.connect(grid,node,X,in_port,port)
		{
			return true;
		}
		journal.rollback_to(grid,checkpoint);
		results.truncate(kept);
	}
	if algo == Algo::Second
	{
		//Jump over whatever blocks the immediate neighbourhood: follow
		//the through ring to the next free midplane, programming the
		//crossed switches as a passthrough segment.
		debug!("looking for the next free midplane after {:?}",node);
		let switch = grid.switch(node,X);
		if !switch.int_wire[2].used && !switch.int_wire[in_port].used
		{
			let wire = switch.ext_wire[2];
			let mut search = ClosureSearch::new();
			if wire.node_tar != node
				&& !grid.switch(wire.node_tar,X).int_wire[wire.port_tar].used
			{
				search.find_next_free(grid,wire.node_tar,X,wire.port_tar,1,results);
			}
			if let Some((transit,landing,entry)) = search.into_jump()
			{
				if !transit.is_empty() && pass.deny.contains(PassFlags::DENY_X)
				{
					debug!("we don't allow X passthroughs");
					pass.denied_hit = true;
					return false;
				}
				let checkpoint = journal.checkpoint();
				let mut applied = true;
				for step in transit.iter()
				{
					if !journal.connect(grid,step.coord,step.dim,step.in_port,step.out_port)
					{
						applied = false;
						break;
					}
				}
				if applied
				{
					if !transit.is_empty()
					{
						pass.found |= PassFlags::FOUND_X;
					}
					let kept = results.len();
					results.push(landing);
					if find_x_path(grid,journal,results,landing,entry,start,
						x_size,found+1,conn,algo,pass)
						&& journal.connect(grid,node,X,in_port,2)
					{
						return true;
					}
					results.truncate(kept);
				}
				journal.rollback_to(grid,checkpoint);
			}
		}
	}
	debug!("couldn't find a path from {:?}",node);
	false
}

///Ends the complete line at `node`: a mesh terminates on port 1, a
///torus searches the shortest return to `start` and programs it.
fn close_x_line(grid: &mut Grid, journal: &mut WireJournal, results: &[Coord],
	node: Coord, in_port: usize, start: Coord, conn: ConnType, pass: &mut PassState) -> bool
{
	if conn == ConnType::Mesh
	{
		debug!("we found the end of the mesh");
		return journal.connect(grid,node,X,in_port,1);
	}
	debug!("finishing the torus");
	let mut search = ClosureSearch::new();
	search.finish_torus(grid,node,X,in_port,0,start);
	let path = match search.into_best()
	{
		Some(path) => path,
		None => return false,
	};
	let passthrough = path.iter().any(|s| !results.contains(&s.coord) );
	if passthrough
	{
		if pass.deny.contains(PassFlags::DENY_X)
		{
			debug!("we don't allow X passthroughs");
			pass.denied_hit = true;
			return false;
		}
		pass.found |= PassFlags::FOUND_X;
	}
	debug!("found a best path with {} steps",path.len());
	let checkpoint = journal.checkpoint();
	for step in path
	{
		if !journal.connect(grid,step.coord,step.dim,step.in_port,step.out_port)
		{
			journal.rollback_to(grid,checkpoint);
			return false;
		}
	}
	true
}

/**
Replicates the programmed line of the long dimension at every offset of
the requested Y and Z extents, then wires the short dimensions of every
line of the block. Fails when a needed midplane is off grid or taken,
or when a short-dimension closure needs a passthrough on a denied axis.
**/
fn fill_in_coords(grid: &mut Grid, journal: &mut WireJournal, results: &mut Vec<Coord>,
	line: &[Coord], origin: Coord, geometry: [usize;NUM_DIMS], conn: ConnType,
	pass: &mut PassState) -> bool
{
	let sides = grid.dims.sides;
	for dy in 0..geometry[Y]
	{
		for dz in 0..geometry[Z]
		{
			if dy==0 && dz==0
			{
				continue;
			}
			for seed in line.iter()
			{
				let y = seed[Y]+dy;
				let z = seed[Z]+dz;
				if y >= sides[Y] || z >= sides[Z]
				{
					return false;
				}
				let replica = [seed[X],y,z];
				if grid.node_used(replica,geometry[X])
				{
					debug!("replica {:?} is taken",replica);
					return false;
				}
				debug!("adding {:?}",replica);
				results.push(replica);
			}
			if !copy_the_path(grid,journal,origin,[origin[X],origin[Y]+dy,origin[Z]+dz],0,X)
			{
				return false;
			}
		}
	}
	for dim in [Y,Z]
	{
		if geometry[dim] == 1
		{
			//trivial terminator on every midplane of the block
			for i in 0..results.len()
			{
				let coord = results[i];
				if !journal.connect(grid,coord,dim,0,1)
				{
					return false;
				}
			}
		}
		else
		{
			let origins: Vec<Coord> = results.iter().copied()
				.filter(|c| c[dim] == origin[dim] ).collect();
			for line_origin in origins
			{
				if !wire_line(grid,journal,results,line_origin,dim,geometry[dim],conn,pass)
				{
					return false;
				}
			}
		}
	}
	for dim in [Y,Z]
	{
		if pass.deny.contains(PassFlags::deny_of(dim)) && pass.found.contains(PassFlags::found_of(dim))
		{
			debug!("we don't allow passthroughs on dim {}",dim);
			pass.denied_hit = true;
			return false;
		}
	}
	true
}

/**
Wires one line of a short dimension from its origin midplane: out
through the origin endpoint, transit through every following switch,
and the terminator per the connection type. A torus keeps stepping
through foreign midplanes until it returns to the origin, flagging the
passthrough; a mesh stops on the last midplane of the extent.
**/
fn wire_line(grid: &mut Grid, journal: &mut WireJournal, block: &[Coord], origin: Coord,
	dim: usize, extent: usize, conn: ConnType, pass: &mut PassState) -> bool
{
	let side = grid.dims.sides[dim];
	if !journal.connect(grid,origin,dim,0,2)
	{
		return false;
	}
	let mut wire = grid.switch(origin,dim).ext_wire[2];
	let mut members = 1;
	for _ in 0..side
	{
		let node = wire.node_tar;
		let entry = wire.port_tar;
		if node == origin
		{
			//the ring is closed
			return conn == ConnType::Torus && journal.connect(grid,origin,dim,entry,1);
		}
		let offset = (node[dim] + side - origin[dim]) % side;
		let member = offset < extent
			&& (0..NUM_DIMS).all(|d| d==dim || node[d]==origin[d] )
			&& block.contains(&node);
		if member
		{
			members += 1;
			if conn == ConnType::Mesh && members == extent
			{
				return journal.connect(grid,node,dim,entry,1);
			}
		}
		else
		{
			if conn == ConnType::Mesh
			{
				return false;
			}
			debug!("passthrough at {:?} on dim {}",node,dim);
			pass.found |= PassFlags::found_of(dim);
		}
		if !journal.connect(grid,node,dim,entry,2)
		{
			return false;
		}
		wire = grid.switch(node,dim).ext_wire[2];
	}
	false
}

/**
Replicates a programmed line into the equivalent midplanes at another
Y-Z offset, walking the internal wire chain from `source_port` and
duplicating each pair on the target switch, then following the external
wire to the next midplane. The walk ends on the endpoint port 1.
Refuses to overwrite a used port.
**/
fn copy_the_path(grid: &mut Grid, journal: &mut WireJournal, source: Coord, target: Coord,
	source_port: usize, dim: usize) -> bool
{
	let pair = grid.switch(source,dim).int_wire[source_port];
	if !pair.used
	{
		debug!("nothing to copy at {:?} port {}",source,source_port);
		return true;
	}
	let out = pair.port_tar;
	if !journal.connect(grid,target,dim,source_port,out)
	{
		return false;
	}
	if out == 1
	{
		//the end of the line
		return true;
	}
	let source_wire = grid.switch(source,dim).ext_wire[out];
	let target_wire = grid.switch(target,dim).ext_wire[out];
	if source_wire.node_tar == source
	{
		debug!("the path leaves through an unwired port, this should never happen");
		return false;
	}
	debug!("copying dim {} {:?} port {} to {:?}",dim,source,out,target);
	copy_the_path(grid,journal,source_wire.node_tar,target_wire.node_tar,
		source_wire.port_tar,dim)
}

/**
Clears a programmed path starting at `(coord,source)`, both ends of
every pair, following external wires until the pair ending on `target`
is cleared. The teardown used by block removal; also safe on already
cleared switches.
**/
pub(crate) fn reset_the_path(grid: &mut Grid, coord: Coord, source: usize, target: usize, dim: usize)
{
	let mut node = coord;
	let mut port = source;
	loop
	{
		let pair = grid.switch(node,dim).int_wire[port];
		if !pair.used
		{
			debug!("reached the end, the source is not used");
			return;
		}
		let partner = pair.port_tar;
		grid.clear_int(node,dim,port);
		grid.clear_int(node,dim,partner);
		if partner == target
		{
			return;
		}
		let wire = grid.switch(node,dim).ext_wire[partner];
		if wire.node_tar == node
		{
			return;
		}
		node = wire.node_tar;
		port = wire.port_tar;
		if node == coord && port == source
		{
			return;
		}
	}
}
