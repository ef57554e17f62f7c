use crate::data::Data1D;
use crate::data::Data2D;
use crate::data::Data3D;
use crate::data::Histogram1D;
use crate::data::Histogram2D;
use crate::data::Histogram3D;
use crate::deck::lexer::tokenize;
use crate::generic::GenericItem;
use crate::generic::GenericList;
use crate::generic::Storable;
use crate::generic::IN_RESTART_FILE;
use anyhow::bail;
use anyhow::Context;
use std::path::Path;

const MAGIC: &str = "# Dissolve restart";
const VERSION: u32 = 1;

/// Write every persistable item of the list as an ordered stream of
/// (class, name, version, payload) records. Output carries no
/// timestamps, so an unchanged list always writes identical bytes.
pub fn save(list: &GenericList, path: &Path) -> anyhow::Result<()> {
    let mut out = format!("{} v{}\n", MAGIC, VERSION);
    for (key, item) in list.items_with_flag(IN_RESTART_FILE) {
        out += &format!("Item  '{}'  {}  {}\n", key, item.class_name(), item.version());
        out += &serde_json::to_string(&item.payload())?;
        out.push('\n');
    }
    std::fs::write(path, out).with_context(|| format!("cannot write restart file '{}'", path.display()))?;
    Ok(())
}

fn revive(class: &str, payload: serde_json::Value) -> anyhow::Result<Option<Box<dyn Storable>>> {
    let item: Box<dyn Storable> = match class {
        "Bool" => Box::new(serde_json::from_value::<bool>(payload)?),
        "Int" => Box::new(serde_json::from_value::<i64>(payload)?),
        "Double" => Box::new(serde_json::from_value::<f64>(payload)?),
        "String" => Box::new(serde_json::from_value::<String>(payload)?),
        "VectorDouble" => Box::new(serde_json::from_value::<Vec<f64>>(payload)?),
        "Data1D" => Box::new(serde_json::from_value::<Data1D>(payload)?),
        "Data2D" => Box::new(serde_json::from_value::<Data2D>(payload)?),
        "Data3D" => Box::new(serde_json::from_value::<Data3D>(payload)?),
        "Histogram1D" => Box::new(serde_json::from_value::<Histogram1D>(payload)?),
        "Histogram2D" => Box::new(serde_json::from_value::<Histogram2D>(payload)?),
        "Histogram3D" => Box::new(serde_json::from_value::<Histogram3D>(payload)?),
        _ => return Ok(None),
    };
    Ok(Some(item))
}

/// Read records back into the list. Unknown trailing record kinds are
/// tolerated with a warning; a malformed header or record is an error.
pub fn load(list: &mut GenericList, path: &Path) -> anyhow::Result<usize> {
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("cannot read restart file '{}'", path.display()))?;
    let mut lines = contents.lines();
    let header = lines.next().unwrap_or_default();
    let Some(version) = header.strip_prefix(MAGIC).map(str::trim) else {
        bail!("'{}' is not a restart file (bad magic)", path.display());
    };
    let version: u32 = version
        .strip_prefix('v')
        .and_then(|v| v.parse().ok())
        .with_context(|| format!("malformed restart version '{}'", version))?;
    if version > VERSION {
        bail!("restart file version {} is newer than this build understands", version);
    }
    let mut restored = 0;
    while let Some(line) = lines.next() {
        let tokens = tokenize(line)?;
        if tokens.is_empty() {
            continue;
        }
        if tokens[0] != "Item" || tokens.len() != 4 {
            bail!("malformed restart record: {}", line);
        }
        let (key, class, item_version) = (&tokens[1], &tokens[2], tokens[3].parse::<u64>()?);
        let payload_line = lines.next().context("restart record is missing its payload")?;
        let payload: serde_json::Value = serde_json::from_str(payload_line)
            .with_context(|| format!("malformed payload for restart item '{}'", key))?;
        match revive(class, payload)? {
            Some(data) => {
                list.insert_item(key.clone(), GenericItem::with_version(data, IN_RESTART_FILE, item_version));
                restored += 1;
            }
            None => log::warn!("ignoring restart item '{}' of unknown class '{}'", key, class),
        }
    }
    Ok(restored)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::Data1D;

    fn scratch(name: &str) -> std::path::PathBuf {
        std::env::temp_dir().join(format!("dissolve-restart-{}-{}", std::process::id(), name))
    }

    fn populated() -> GenericList {
        let mut list = GenericList::default();
        *list.realise::<f64>("Energy", "bulk", IN_RESTART_FILE) = -1234.56789;
        *list.realise::<i64>("Iteration", "", IN_RESTART_FILE) = 5;
        *list.realise::<String>("Status", "", IN_RESTART_FILE) = "running".to_string();
        *list.realise::<Vec<f64>>("History", "bulk", IN_RESTART_FILE) = vec![1.0, 0.1, 1e-17];
        let gr = list.realise::<Data1D>("gr_bulk", "rdf", IN_RESTART_FILE);
        gr.x = vec![0.025, 0.075, 0.125];
        gr.values = vec![0.0, 0.5, 1.03125];
        // unflagged items stay out of the restart file
        *list.realise::<f64>("Scratch", "", 0) = 9.9;
        list
    }

    #[test]
    fn write_read_write_is_byte_identical() {
        let list = populated();
        let first = scratch("first");
        let second = scratch("second");
        save(&list, &first).unwrap();
        let mut reread = GenericList::default();
        let restored = load(&mut reread, &first).unwrap();
        assert_eq!(restored, 5);
        save(&reread, &second).unwrap();
        assert_eq!(std::fs::read(&first).unwrap(), std::fs::read(&second).unwrap());
        std::fs::remove_file(first).ok();
        std::fs::remove_file(second).ok();
    }

    #[test]
    fn values_round_trip_bit_identically() {
        let list = populated();
        let path = scratch("roundtrip");
        save(&list, &path).unwrap();
        let mut reread = GenericList::default();
        load(&mut reread, &path).unwrap();
        assert_eq!(reread.value("Energy", "bulk", 0.0).to_bits(), (-1234.56789f64).to_bits());
        assert_eq!(reread.value("Iteration", "", 0i64), 5);
        assert_eq!(reread.value("Status", "", String::new()), "running");
        assert_eq!(reread.value("History", "bulk", Vec::new()), vec![1.0, 0.1, 1e-17]);
        assert_eq!(reread.value("gr_bulk", "rdf", Data1D::default()), list.value("gr_bulk", "rdf", Data1D::default()));
        assert!(!reread.contains("Scratch", ""));
        // versions survive the trip
        assert_eq!(reread.version("Energy", "bulk"), list.version("Energy", "bulk"));
        std::fs::remove_file(path).ok();
    }

    #[test]
    fn unknown_record_classes_are_skipped() {
        let path = scratch("unknown");
        let text = format!(
            "{} v{}\nItem  'bulk/Energy'  Double  1\n-1.5\nItem  'later/Thing'  FutureClass  3\n{{\"a\":1}}\n",
            MAGIC, VERSION,
        );
        std::fs::write(&path, text).unwrap();
        let mut list = GenericList::default();
        assert_eq!(load(&mut list, &path).unwrap(), 1);
        assert_eq!(list.value("Energy", "bulk", 0.0), -1.5);
        std::fs::remove_file(path).ok();
    }

    #[test]
    fn bad_magic_is_an_error() {
        let path = scratch("magic");
        std::fs::write(&path, "not a restart file\n").unwrap();
        let mut list = GenericList::default();
        assert!(load(&mut list, &path).is_err());
        std::fs::remove_file(path).ok();
    }
}
