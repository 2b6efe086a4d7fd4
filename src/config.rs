/*!

The slice of the site configuration file the allocator consumes. The
file carries many more keys for the surrounding subsystems; only the
layout ones are read here and the rest are ignored.

```toml
LayoutMode = "STATIC"
DenyPassthrough = "X,Z"
BasePartitionNodeCnt = 512
NodeCardNodeCnt = 32
```

*/

use serde::{Deserialize,Deserializer};
use serde::de::Error as _;

use crate::PassFlags;

///How blocks come into existence on this machine. The allocator itself
///behaves the same under all three; the surrounding daemon consults it.
#[derive(Clone,Copy,Debug,PartialEq,Eq,Deserialize)]
pub enum LayoutMode
{
	#[serde(rename = "STATIC")]
	Static,
	#[serde(rename = "OVERLAP")]
	Overlap,
	#[serde(rename = "DYNAMIC")]
	Dynamic,
}

///Layout configuration. Every key is optional; `DenyPassthrough`
///becomes the default for requests that do not bring their own.
#[derive(Clone,Debug,Deserialize)]
#[serde(default)]
pub struct LayoutConfig
{
	#[serde(rename = "LayoutMode")]
	pub layout_mode: LayoutMode,
	#[serde(rename = "DenyPassthrough", deserialize_with = "deserialize_deny")]
	pub deny_passthrough: PassFlags,
	#[serde(rename = "BasePartitionNodeCnt")]
	pub base_partition_node_cnt: u32,
	#[serde(rename = "NodeCardNodeCnt")]
	pub node_card_node_cnt: u32,
}

impl Default for LayoutConfig
{
	fn default() -> LayoutConfig
	{
		LayoutConfig{
			layout_mode: LayoutMode::Static,
			deny_passthrough: PassFlags::empty(),
			base_partition_node_cnt: 512,
			node_card_node_cnt: 32,
		}
	}
}

impl LayoutConfig
{
	pub fn from_toml_str(text: &str) -> Result<LayoutConfig,toml::de::Error>
	{
		toml::from_str(text)
	}
	///Midplanes needed to hold `procs` processors, at least one.
	pub fn midplanes_for_procs(&self, procs: usize) -> usize
	{
		let per_midplane = self.base_partition_node_cnt.max(1) as usize;
		1.max((procs + per_midplane - 1) / per_midplane)
	}
}

///Parses the comma list over `X,Y,Z` into the deny bits.
pub fn parse_deny_passthrough(text: &str) -> Result<PassFlags,String>
{
	let mut flags = PassFlags::empty();
	for item in text.split(',')
	{
		let item = item.trim();
		flags |= match item
		{
			"" => PassFlags::empty(),
			"X" | "x" => PassFlags::DENY_X,
			"Y" | "y" => PassFlags::DENY_Y,
			"Z" | "z" => PassFlags::DENY_Z,
			other => return Err(format!("`{}` is not an axis",other)),
		};
	}
	Ok(flags)
}

fn deserialize_deny<'de,D>(deserializer: D) -> Result<PassFlags,D::Error>
	where D: Deserializer<'de>
{
	let text = String::deserialize(deserializer)?;
	parse_deny_passthrough(&text).map_err(D::Error::custom)
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn defaults()
	{
		let config = LayoutConfig::from_toml_str("").unwrap();
		assert_eq!(config.layout_mode,LayoutMode::Static);
		assert!(config.deny_passthrough.is_empty());
		assert_eq!(config.base_partition_node_cnt,512);
		assert_eq!(config.node_card_node_cnt,32);
	}

	#[test]
	fn full_file()
	{
		let text = r#"
LayoutMode = "DYNAMIC"
DenyPassthrough = "X,Z"
BasePartitionNodeCnt = 128
NodeCardNodeCnt = 16
#keys of other subsystems are ignored
Numpsets = 8
MloaderImage = "/bgl/mloader"
"#;
		let config = LayoutConfig::from_toml_str(text).unwrap();
		assert_eq!(config.layout_mode,LayoutMode::Dynamic);
		assert_eq!(config.deny_passthrough,PassFlags::DENY_X | PassFlags::DENY_Z);
		assert_eq!(config.base_partition_node_cnt,128);
		assert_eq!(config.node_card_node_cnt,16);
	}

	#[test]
	fn deny_list()
	{
		assert_eq!(parse_deny_passthrough("").unwrap(),PassFlags::empty());
		assert_eq!(parse_deny_passthrough("Y").unwrap(),PassFlags::DENY_Y);
		assert_eq!(parse_deny_passthrough("X, y ,Z").unwrap(),
			PassFlags::DENY_X | PassFlags::DENY_Y | PassFlags::DENY_Z);
		assert!(parse_deny_passthrough("X,W").is_err());
		assert!(LayoutConfig::from_toml_str("DenyPassthrough = \"Q\"").is_err());
	}

	#[test]
	fn procs_sizing()
	{
		let config = LayoutConfig::default();
		assert_eq!(config.midplanes_for_procs(1),1);
		assert_eq!(config.midplanes_for_procs(512),1);
		assert_eq!(config.midplanes_for_procs(513),2);
		assert_eq!(config.midplanes_for_procs(2048),4);
	}
}
