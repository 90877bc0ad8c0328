//! `dropsort parse`: Show how names parse as fragments.

use dropsort_core::fragment::parse_fragment;

pub fn run(names: &[String]) -> Result<(), Box<dyn std::error::Error>> {
    for name in names {
        match parse_fragment(name) {
            Some(d) => println!(
                "{}",
                serde_json::to_string_pretty(&serde_json::json!({
                    "name": name,
                    "group_key": d.group_key,
                    "folder_name": d.folder_name,
                    "timestamp": d.timestamp,
                    "part": d.part_number,
                    "total": d.declared_total_parts,
                }))?
            ),
            None => println!("{name}: not a fragment"),
        }
    }
    Ok(())
}
