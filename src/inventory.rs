/*!

Import of the machine description kept by the control system: which
midplane id sits at which coordinate, how the cables run, and which
blocks already exist on the fabric. Everything here validates against
the virtual grid before mutating it, so a conflicting import leaves the
grid untouched.

*/

use std::collections::{HashMap,HashSet};

use log::debug;
use serde::Deserialize;

use crate::error::{Error,Result};
use crate::grid::{Coord,Grid,Used,NodeState,X,NUM_DIMS,NUM_PORTS_PER_NODE};
use crate::grid::wiring::WireSource;
use crate::hostlist;

///A midplane of the inventory: its control system id and coordinate.
#[derive(Clone,Debug,Deserialize)]
pub struct BpEntry
{
	pub bp_id: String,
	pub coord: Coord,
}

///A cable between two switch ports of the same dimension.
#[derive(Clone,Debug,Deserialize)]
pub struct CableEntry
{
	pub dim: usize,
	pub from_bp: String,
	pub from_port: usize,
	pub to_bp: String,
	pub to_port: usize,
}

///One switch connection of a named block, from `p1` to `p2`.
#[derive(Clone,Copy,Debug,Deserialize)]
pub struct SwitchConn
{
	pub p1: usize,
	pub p2: usize,
}

///A programmed switch of a named block.
#[derive(Clone,Debug,Deserialize)]
pub struct BlockSwitch
{
	pub bp_id: String,
	pub dim: usize,
	pub conns: Vec<SwitchConn>,
}

///A block as the control system describes it.
#[derive(Clone,Debug,Deserialize)]
pub struct BlockEntry
{
	pub block_id: String,
	///Midplanes of the block; consulted when there are no switches, as
	///for the small blocks carved inside a single midplane.
	#[serde(default)]
	pub bp_ids: Vec<String>,
	#[serde(default)]
	pub switches: Vec<BlockSwitch>,
}

///The whole import.
#[derive(Clone,Debug,Default,Deserialize)]
pub struct Inventory
{
	pub midplanes: Vec<BpEntry>,
	#[serde(default)]
	pub cables: Vec<CableEntry>,
	#[serde(default)]
	pub blocks: Vec<BlockEntry>,
}

///Canonical form of a midplane id. Two generations of the format are
///accepted, `R000` and `R00-M0`; the numeric interior is opaque.
fn normalize_bp_id(bp_id: &str) -> Result<String>
{
	let upper = bp_id.to_ascii_uppercase();
	let chars: Vec<char> = upper.chars().collect();
	match chars.len()
	{
		4 if chars[0]=='R' => Ok(format!("R{}{}-M{}",chars[1],chars[2],chars[3])),
		6 if chars[0]=='R' && chars[3]=='-' && chars[4]=='M' => Ok(upper),
		_ => Err(Error::LookupFailed(format!("`{}` is not a midplane id",bp_id))),
	}
}

///The bidirectional mapping between midplane ids and coordinates,
///consulted on every inventory import.
#[derive(Clone,Debug,Default)]
pub struct BpMap
{
	by_id: HashMap<String,Coord>,
	by_coord: HashMap<Coord,String>,
}

impl BpMap
{
	pub fn set_bp_map(entries: &[BpEntry]) -> Result<BpMap>
	{
		let mut map = BpMap::default();
		for entry in entries
		{
			let id = normalize_bp_id(&entry.bp_id)?;
			if map.by_id.insert(id.clone(),entry.coord).is_some()
			{
				return Err(Error::Conflict(format!("midplane id {} appears twice",id)));
			}
			if map.by_coord.insert(entry.coord,id).is_some()
			{
				return Err(Error::Conflict(format!("coordinate {:?} appears twice",entry.coord)));
			}
		}
		Ok(map)
	}
	///Coordinates of a midplane id in either accepted form.
	pub fn find_bp_loc(&self, bp_id: &str) -> Result<Coord>
	{
		let id = normalize_bp_id(bp_id)?;
		self.by_id.get(&id).copied().ok_or_else(||
			Error::LookupFailed(format!("midplane id {} is not in the map",id)) )
	}
	///The inverse lookup.
	pub fn find_bp_rack_mid(&self, coord: Coord) -> Result<&str>
	{
		self.by_coord.get(&coord).map(|s| s.as_str() ).ok_or_else(||
			Error::LookupFailed(format!("no midplane id at {:?}",coord)) )
	}
}

///External wires taken from the inventory cables instead of the
///emulated layout.
pub struct InventoryWires<'a>
{
	pub inventory: &'a Inventory,
	pub map: &'a BpMap,
}

impl<'a> WireSource for InventoryWires<'a>
{
	fn install(&self, grid: &mut Grid) -> Result<()>
	{
		//Resolve and validate every cable before touching the grid.
		let mut cables = Vec::with_capacity(self.inventory.cables.len());
		for cable in self.inventory.cables.iter()
		{
			if cable.dim >= NUM_DIMS || cable.from_port >= NUM_PORTS_PER_NODE
				|| cable.to_port >= NUM_PORTS_PER_NODE
			{
				return Err(Error::Conflict(format!(
					"cable {}:{} to {}:{} has no such port or dimension",
					cable.from_bp,cable.from_port,cable.to_bp,cable.to_port)));
			}
			let source = self.map.find_bp_loc(&cable.from_bp)?;
			let target = self.map.find_bp_loc(&cable.to_bp)?;
			if !grid.dims.contains(source) || !grid.dims.contains(target)
			{
				return Err(Error::LookupFailed(format!(
					"cable {} to {} leaves the grid",cable.from_bp,cable.to_bp)));
			}
			cables.push((source,target,cable.dim,cable.from_port,cable.to_port));
		}
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
		for (source,target,dim,from_port,to_port) in cables
		{
			debug!("dim {} from {:?} {} to {:?} {}",dim,source,from_port,target,to_port);
			grid.switch_config(source,target,dim,from_port,to_port);
		}
		Ok(())
	}
}

impl Inventory
{
	pub fn find_block(&self, block_id: &str) -> Result<&BlockEntry>
	{
		self.blocks.iter().find(|b| b.block_id.eq_ignore_ascii_case(block_id) )
			.ok_or_else(|| Error::LookupFailed(format!(
				"block {} is not in the inventory",block_id)) )
	}
}

/**
Marks the wires of a named block of the inventory as used in the
virtual grid. Every connection is validated before anything is written,
so a block that would double-use a port fails without touching the
grid.
**/
pub fn load_block_wiring(grid: &mut Grid, map: &BpMap, inventory: &Inventory,
	block_id: &str) -> Result<()>
{
	let block = inventory.find_block(block_id)?;
	debug!("loading wiring of block {}",block.block_id);
	if block.switches.is_empty()
	{
		let bp_id = block.bp_ids.first().ok_or_else(||
			Error::LookupFailed(format!("block {} names no midplane",block.block_id)) )?;
		let coord = map.find_bp_loc(bp_id)?;
		if grid.midplane(coord).used != Used::Free
		{
			return Err(Error::Conflict(format!(
				"midplane {:?} of block {} is already in use",coord,block.block_id)));
		}
		grid.midplane_mut(coord).used = Used::Allocated;
		return Ok(());
	}
	//Validation pass. Pending marks catch double use inside the block itself.
	let mut pending_ports: HashSet<(Coord,usize,usize)> = HashSet::new();
	let mut pending_used: HashSet<Coord> = HashSet::new();
	for switch in block.switches.iter()
	{
		if switch.dim >= NUM_DIMS
		{
			return Err(Error::Conflict(format!(
				"switch of {} on {} has no dimension {}",block.block_id,switch.bp_id,switch.dim)));
		}
		let coord = map.find_bp_loc(&switch.bp_id)?;
		for conn in switch.conns.iter()
		{
			if !matches!(conn.p1,1|2|4)
			{
				return Err(Error::Conflict(format!("unknown source port {}",conn.p1)));
			}
			if !matches!(conn.p2,0|3|5)
			{
				return Err(Error::Conflict(format!("unknown target port {}",conn.p2)));
			}
			if conn.p1==1 && switch.dim==X
			{
				if grid.midplane(coord).used != Used::Free || !pending_used.insert(coord)
				{
					return Err(Error::Conflict(format!(
						"midplane {:?} is already in use",coord)));
				}
			}
			for port in [conn.p1,conn.p2]
			{
				if grid.switch(coord,switch.dim).int_wire[port].used
					|| !pending_ports.insert((coord,switch.dim,port))
				{
					return Err(Error::Conflict(format!(
						"{:?} dim {} port {} is already in use",coord,switch.dim,port)));
				}
			}
		}
	}
	//Apply pass.
	for switch in block.switches.iter()
	{
		let coord = map.find_bp_loc(&switch.bp_id)?;
		for conn in switch.conns.iter()
		{
			debug!("connection going from {} to {}",conn.p1,conn.p2);
			if conn.p1==1 && switch.dim==X
			{
				grid.midplane_mut(coord).used = Used::Allocated;
			}
			grid.connect_int(coord,switch.dim,conn.p1,conn.p2);
		}
	}
	Ok(())
}

///A midplane record supplied by an external caller for merging, with
///its availability and the internal wires it claims.
#[derive(Clone,Debug)]
pub struct NodeConfig
{
	pub coord: Coord,
	pub used: bool,
	///Claimed wires as `(dim, port, port_tar)`. Callers supply both
	///halves of each pair.
	pub wires: Vec<(usize,usize,usize)>,
}

/**
Verifies that an externally supplied list of midplanes and their
internal wiring does not conflict with the current grid, and if so
merges it in. The verification is complete before the first write;
on `Err` the grid is untouched.

A claimed wire only conflicts with a live wire pointing somewhere
else: re-asserting the identical wire, or writing over an idle
self-pointing entry, is allowed.
**/
pub fn check_and_set_node_list(grid: &mut Grid, nodes: &[NodeConfig]) -> Result<()>
{
	let mut pending_ports: HashSet<(Coord,usize,usize)> = HashSet::new();
	let mut pending_used: HashSet<Coord> = HashSet::new();
	for node in nodes
	{
		if !grid.dims.contains(node.coord)
		{
			return Err(Error::LookupFailed(format!("{:?} lies outside the grid",node.coord)));
		}
		if node.used
		{
			if grid.midplane(node.coord).used != Used::Free || !pending_used.insert(node.coord)
			{
				debug!("already been to this node {:?}",node.coord);
				return Err(Error::Conflict(format!(
					"midplane {:?} is already in use",node.coord)));
			}
		}
		for &(dim,port,port_tar) in node.wires.iter()
		{
			if dim >= NUM_DIMS || port >= NUM_PORTS_PER_NODE || port_tar >= NUM_PORTS_PER_NODE
			{
				return Err(Error::Conflict(format!(
					"{:?} claims a wire outside the switch: dim {} port {}",node.coord,dim,port)));
			}
			let current = grid.switch(node.coord,dim).int_wire[port];
			if current.used && current.port_tar != port && current.port_tar != port_tar
			{
				return Err(Error::Conflict(format!(
					"{:?} dim {} port {} is already in use to {}",
					node.coord,dim,port,current.port_tar)));
			}
			if !pending_ports.insert((node.coord,dim,port))
			{
				return Err(Error::Conflict(format!(
					"{:?} dim {} port {} is claimed twice",node.coord,dim,port)));
			}
		}
	}
	for node in nodes
	{
		if node.used
		{
			grid.midplane_mut(node.coord).used = Used::Allocated;
		}
		for &(dim,port,port_tar) in node.wires.iter()
		{
			let wire = &mut grid.switch_mut(node.coord,dim).int_wire[port];
			wire.used = true;
			wire.port_tar = port_tar;
		}
	}
	Ok(())
}

/**
Transiently excludes the named midplanes from allocation. Midplanes
already allocated or down keep their state. Call
[`reset_all_removed_bps`] before the next allocation attempt.
**/
pub fn removable_set_bps(grid: &mut Grid, bps: &str) -> Result<()>
{
	let coords = hostlist::parse(bps,&grid.dims)?;
	for coord in coords
	{
		if grid.midplane(coord).used == Used::Free
		{
			grid.midplane_mut(coord).used = Used::Removed;
		}
	}
	Ok(())
}

///Undoes [`removable_set_bps`] and [`set_all_bps_except`].
pub fn reset_all_removed_bps(grid: &mut Grid)
{
	for index in 0..grid.dims.size
	{
		let coord = grid.dims.unpack(index);
		if grid.midplane(coord).used == Used::Removed
		{
			grid.midplane_mut(coord).used = Used::Free;
		}
	}
}

/**
The complement of [`removable_set_bps`]: transiently excludes every
midplane except the named ones. The named midplanes must be idle.
**/
pub fn set_all_bps_except(grid: &mut Grid, bps: &str) -> Result<()>
{
	let coords = hostlist::parse(bps,&grid.dims)?;
	for coord in coords.iter()
	{
		if grid.midplane(*coord).state != NodeState::Idle
		{
			return Err(Error::Conflict(format!("we can't use this node {:?}",coord)));
		}
	}
	for coord in coords
	{
		grid.midplane_mut(coord).state = NodeState::End;
	}
	for index in 0..grid.dims.size
	{
		let coord = grid.dims.unpack(index);
		let midplane = grid.midplane_mut(coord);
		if midplane.state == NodeState::End
		{
			midplane.state = NodeState::Idle;
			midplane.used = Used::Free;
		}
		else if midplane.used == Used::Free
		{
			midplane.used = Used::Removed;
		}
	}
	Ok(())
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::grid::GridDims;

	fn small_map() -> BpMap
	{
		BpMap::set_bp_map(&[
			BpEntry{ bp_id:"R000".into(), coord:[0,0,0] },
			BpEntry{ bp_id:"R00-M1".into(), coord:[1,0,0] },
			BpEntry{ bp_id:"R010".into(), coord:[0,1,0] },
		]).unwrap()
	}

	#[test]
	fn id_forms_resolve()
	{
		let map = small_map();
		assert_eq!(map.find_bp_loc("R000").unwrap(),[0,0,0]);
		assert_eq!(map.find_bp_loc("R00-M0").unwrap(),[0,0,0]);
		assert_eq!(map.find_bp_loc("R001").unwrap(),[1,0,0]);
		assert_eq!(map.find_bp_loc("r00-m1").unwrap(),[1,0,0]);
		assert_eq!(map.find_bp_rack_mid([0,1,0]).unwrap(),"R01-M0");
		assert!(matches!(map.find_bp_loc("R020"),Err(Error::LookupFailed(_))));
		assert!(matches!(map.find_bp_loc("Q000"),Err(Error::LookupFailed(_))));
	}

	#[test]
	fn duplicate_ids_conflict()
	{
		let entries = [
			BpEntry{ bp_id:"R000".into(), coord:[0,0,0] },
			BpEntry{ bp_id:"R00-M0".into(), coord:[1,0,0] },
		];
		assert!(matches!(BpMap::set_bp_map(&entries),Err(Error::Conflict(_))));
	}

	#[test]
	fn block_wiring_conflicts_atomically()
	{
		let mut grid = Grid::new_emulated(GridDims::new([2,2,2])).unwrap();
		let map = small_map();
		let inventory = Inventory{
			midplanes: vec![],
			cables: vec![],
			blocks: vec![BlockEntry{
				block_id: "RMP0".into(),
				bp_ids: vec![],
				switches: vec![
					BlockSwitch{ bp_id:"R000".into(), dim:X, conns: vec![
						SwitchConn{ p1:1, p2:5 },
						SwitchConn{ p1:2, p2:0 },
					]},
				],
			}],
		};
		load_block_wiring(&mut grid,&map,&inventory,"RMP0").unwrap();
		assert_eq!(grid.midplane([0,0,0]).used,Used::Allocated);
		assert!(grid.switch([0,0,0],X).int_wire[1].used);
		assert_eq!(grid.switch([0,0,0],X).int_wire[2].port_tar,0);
		//A second load of the same block must fail and change nothing.
		let snapshot = grid.clone();
		let r = load_block_wiring(&mut grid,&map,&inventory,"RMP0");
		assert!(matches!(r,Err(Error::Conflict(_))));
		assert_eq!(grid,snapshot);
		assert!(matches!(load_block_wiring(&mut grid,&map,&inventory,"RMP9"),
			Err(Error::LookupFailed(_))));
	}

	#[test]
	fn node_list_merge_is_atomic()
	{
		let mut grid = Grid::new_emulated(GridDims::new([2,2,2])).unwrap();
		let good = NodeConfig{ coord:[0,0,0], used:true, wires: vec![(X,0,1),(X,1,0)] };
		check_and_set_node_list(&mut grid,&[good.clone()]).unwrap();
		assert!(grid.switch([0,0,0],X).int_wire[0].used);
		let snapshot = grid.clone();
		//Conflicts with the wire just merged.
		let bad = NodeConfig{ coord:[0,0,0], used:false, wires: vec![(X,0,2)] };
		let other = NodeConfig{ coord:[1,0,0], used:true, wires: vec![] };
		let r = check_and_set_node_list(&mut grid,&[other,bad]);
		assert!(matches!(r,Err(Error::Conflict(_))));
		assert_eq!(grid,snapshot);
		//Re-asserting the identical wire is not a conflict.
		check_and_set_node_list(&mut grid,&[NodeConfig{ coord:[0,0,0], used:false,
			wires: vec![(X,0,1)] }]).unwrap();
	}

	#[test]
	fn wires_from_the_inventory()
	{
		let map = small_map();
		let inventory = Inventory{
			midplanes: vec![
				BpEntry{ bp_id:"R000".into(), coord:[0,0,0] },
				BpEntry{ bp_id:"R001".into(), coord:[1,0,0] },
			],
			cables: vec![
				CableEntry{ dim:X, from_bp:"R000".into(), from_port:2,
					to_bp:"R00-M1".into(), to_port:5 },
				CableEntry{ dim:X, from_bp:"R001".into(), from_port:2,
					to_bp:"R000".into(), to_port:5 },
			],
			blocks: vec![],
		};
		let mut grid = Grid::new(GridDims::new([2,1,1]));
		InventoryWires{ inventory:&inventory, map:&map }.install(&mut grid).unwrap();
		let wire = grid.switch([0,0,0],X).ext_wire[2];
		assert_eq!(wire.node_tar,[1,0,0]);
		assert_eq!(wire.port_tar,5);
		let back = grid.switch([1,0,0],X).ext_wire[5];
		assert_eq!(back.node_tar,[0,0,0]);
		//uncabled ports stay self-pointing
		assert_eq!(grid.switch([0,0,0],X).ext_wire[4].node_tar,[0,0,0]);

		let bad = Inventory{
			midplanes: vec![],
			cables: vec![CableEntry{ dim:X, from_bp:"R020".into(), from_port:2,
				to_bp:"R000".into(), to_port:5 }],
			blocks: vec![],
		};
		let r = InventoryWires{ inventory:&bad, map:&map }.install(&mut grid);
		assert!(matches!(r,Err(Error::LookupFailed(_))));
	}

	#[test]
	fn transient_exclusion()
	{
		let mut grid = Grid::new_emulated(GridDims::new([2,2,2])).unwrap();
		removable_set_bps(&mut grid,"[000x011]").unwrap();
		assert_eq!(grid.midplane([0,0,0]).used,Used::Removed);
		assert_eq!(grid.midplane([1,0,0]).used,Used::Free);
		reset_all_removed_bps(&mut grid);
		assert_eq!(grid.midplane([0,0,0]).used,Used::Free);

		set_all_bps_except(&mut grid,"100,110").unwrap();
		assert_eq!(grid.midplane([1,0,0]).used,Used::Free);
		assert_eq!(grid.midplane([0,0,0]).used,Used::Removed);
		reset_all_removed_bps(&mut grid);
	}
}
