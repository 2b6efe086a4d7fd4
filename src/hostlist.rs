/*!

The compact range encoding used to name sets of midplanes.

A single midplane is three characters, one digit `0-9A-Z` per axis. A
range `[AAAxBBB]` is the whole box with corners `AAA` and `BBB`
inclusive; `-` is accepted in place of `x`. A list is comma-separated
ranges and singles inside the brackets. Coordinates outside the grid
are rejected.

*/

use crate::error::{Error,Result};
use crate::grid::{Coord,GridDims,NUM_DIMS};

///Positional base of the encoding, one digit per axis.
pub const HOSTLIST_BASE: usize = 36;

const DIGITS: &[u8; HOSTLIST_BASE] = b"0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZ";

///The digit character of one coordinate. Panics at or above the base;
///grids that large do not exist.
pub fn coord_char(value: usize) -> char
{
	if value >= HOSTLIST_BASE
	{
		panic!("coordinate {} does not fit a base {} digit",value,HOSTLIST_BASE);
	}
	DIGITS[value] as char
}

fn char_digit(c: char) -> Option<usize>
{
	match c
	{
		'0'..='9' => Some(c as usize - '0' as usize),
		'A'..='Z' => Some(c as usize - 'A' as usize + 10),
		_ => None,
	}
}

///The three-character name of one midplane.
pub fn bp_name(coord: Coord) -> String
{
	coord.iter().map(|&c| coord_char(c) ).collect()
}

///Renders a set of midplanes in the compact form: a bare name for one
///midplane, a single `[AAAxBBB]` when the set is exactly a box, and
///otherwise a bracketed comma list merging runs along the Z axis.
pub fn render(coords: &[Coord]) -> String
{
	if coords.len() == 1
	{
		return bp_name(coords[0]);
	}
	let mut sorted = coords.to_vec();
	sorted.sort();
	sorted.dedup();
	if sorted.len() == 1
	{
		return bp_name(sorted[0]);
	}
	let mut low = sorted[0];
	let mut high = sorted[0];
	for c in sorted.iter()
	{
		for d in 0..NUM_DIMS
		{
			low[d] = low[d].min(c[d]);
			high[d] = high[d].max(c[d]);
		}
	}
	let volume: usize = (0..NUM_DIMS).map(|d| high[d]-low[d]+1 ).product();
	if volume == sorted.len()
	{
		return format!("[{}x{}]",bp_name(low),bp_name(high));
	}
	//Not a box: merge consecutive Z runs sharing (x,y).
	let mut items = Vec::new();
	let mut i = 0;
	while i < sorted.len()
	{
		let first = sorted[i];
		let mut last = first;
		while i+1 < sorted.len()
		{
			let next = sorted[i+1];
			if next[0]==last[0] && next[1]==last[1] && next[2]==last[2]+1
			{
				last = next;
				i += 1;
			}
			else
			{
				break;
			}
		}
		if first == last
		{
			items.push(bp_name(first));
		}
		else
		{
			items.push(format!("{}x{}",bp_name(first),bp_name(last)));
		}
		i += 1;
	}
	format!("[{}]",items.join(","))
}

fn parse_name(token: &str, dims: &GridDims) -> Result<Coord>
{
	let chars: Vec<char> = token.chars().collect();
	if chars.len() != NUM_DIMS
	{
		return Err(Error::LookupFailed(format!("`{}` is not a midplane name",token)));
	}
	let mut coord = [0; NUM_DIMS];
	for (d,c) in chars.iter().enumerate()
	{
		let digit = char_digit(*c).ok_or_else(||
			Error::LookupFailed(format!("`{}` is not a midplane name",token)) )?;
		if digit >= dims.sides[d]
		{
			return Err(Error::LookupFailed(format!("`{}` lies outside the grid",token)));
		}
		coord[d] = digit;
	}
	Ok(coord)
}

/**
Parses a hostlist into the midplanes it names, expanded and in range
order. Accepts bracketed lists, bare names and bare comma lists, with
an optional lowercase machine prefix before each item.
**/
pub fn parse(list: &str, dims: &GridDims) -> Result<Vec<Coord>>
{
	let mut text = list.trim().trim_start_matches(|c:char| c.is_ascii_lowercase() );
	if let Some(open) = text.strip_prefix('[')
	{
		text = open.strip_suffix(']').ok_or_else(||
			Error::LookupFailed(format!("unbalanced brackets in `{}`",list)) )?;
	}
	let mut result = Vec::new();
	for raw in text.split(',')
	{
		let token = raw.trim().trim_start_matches(|c:char| c.is_ascii_lowercase() );
		if token.is_empty()
		{
			return Err(Error::LookupFailed(format!("empty entry in `{}`",list)));
		}
		let range: Vec<&str> = token.splitn(2,&['x','-'][..]).collect();
		match range[..]
		{
			[single] => result.push(parse_name(single,dims)?),
			[start,end] =>
			{
				let start = parse_name(start,dims)?;
				let end = parse_name(end,dims)?;
				for d in 0..NUM_DIMS
				{
					if start[d] > end[d]
					{
						return Err(Error::LookupFailed(
							format!("range `{}` has inverted corners",token)));
					}
				}
				for x in start[0]..=end[0]
				{
					for y in start[1]..=end[1]
					{
						for z in start[2]..=end[2]
						{
							result.push([x,y,z]);
						}
					}
				}
			}
			_ => return Err(Error::LookupFailed(format!("`{}` is not a range",token))),
		}
	}
	Ok(result)
}

#[cfg(test)]
mod tests {
	use super::*;

	fn dims() -> GridDims
	{
		GridDims::new([4,4,4])
	}

	#[test]
	fn single_names()
	{
		assert_eq!(bp_name([0,0,0]),"000");
		assert_eq!(bp_name([3,1,2]),"312");
		assert_eq!(coord_char(35),'Z');
		assert_eq!(render(&[[1,2,3]]),"123");
	}

	#[test]
	fn box_render()
	{
		let mut coords = Vec::new();
		for x in 0..2 { for y in 0..2 { for z in 0..2 { coords.push([x,y,z]); } } }
		assert_eq!(render(&coords),"[000x111]");
	}

	#[test]
	fn ragged_render()
	{
		assert_eq!(render(&[[0,0,0],[0,0,1],[0,0,2],[2,1,0]]),"[000x002,210]");
	}

	#[test]
	fn parse_forms()
	{
		assert_eq!(parse("000",&dims()).unwrap(),vec![[0,0,0]]);
		assert_eq!(parse("[000x011]",&dims()).unwrap(),
			vec![[0,0,0],[0,0,1],[0,1,0],[0,1,1]]);
		assert_eq!(parse("[000-011]",&dims()).unwrap().len(),4);
		assert_eq!(parse("300,310",&dims()).unwrap(),vec![[3,0,0],[3,1,0]]);
		assert_eq!(parse("bgl123",&dims()).unwrap(),vec![[1,2,3]]);
	}

	#[test]
	fn parse_rejects()
	{
		assert!(matches!(parse("940",&dims()),Err(Error::LookupFailed(_))));
		assert!(matches!(parse("[000x011",&dims()),Err(Error::LookupFailed(_))));
		assert!(matches!(parse("00",&dims()),Err(Error::LookupFailed(_))));
		assert!(matches!(parse("[110x000]",&dims()),Err(Error::LookupFailed(_))));
	}

	#[test]
	fn render_parse_round_trip()
	{
		let coords = vec![[0,0,0],[1,0,0],[0,1,0],[1,1,0]];
		let mut back = parse(&render(&coords),&dims()).unwrap();
		back.sort();
		let mut sorted = coords.clone();
		sorted.sort();
		assert_eq!(back,sorted);
	}
}
