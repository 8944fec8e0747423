use std::path::Path;

use tracing::{info, warn};

/// Parse the overlay topology file and return the outbound neighbor ids
/// for `self_id`.
///
/// Each non-blank line has the form `SRC -> D1, D2, ...` with `host:port`
/// identifiers. A missing file, malformed lines, or no line for `self_id`
/// all yield an empty neighbor set (the node runs isolated); topology
/// problems never abort startup.
pub fn load_neighbors(path: impl AsRef<Path>, self_id: &str) -> Vec<String> {
    let path = path.as_ref();
    let contents = match std::fs::read_to_string(path) {
        Ok(contents) => contents,
        Err(e) => {
            warn!("topology file {} not readable: {e}", path.display());
            return Vec::new();
        }
    };

    for line in contents.lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let Some((source, destinations)) = line.split_once("->") else {
            continue;
        };
        if source.trim() != self_id {
            continue;
        }

        let neighbors: Vec<String> = destinations
            .split(',')
            .map(|d| d.trim().to_string())
            .filter(|d| !d.is_empty())
            .collect();
        info!(
            count = neighbors.len(),
            "loaded topology neighbors for {self_id}"
        );
        return neighbors;
    }

    Vec::new()
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use super::*;

    struct TempTopology(PathBuf);

    impl TempTopology {
        fn write(name: &str, contents: &str) -> Self {
            let path = std::env::temp_dir().join(format!(
                "vc-topology-{}-{name}.dat",
                std::process::id()
            ));
            std::fs::write(&path, contents).unwrap();
            Self(path)
        }
    }

    impl Drop for TempTopology {
        fn drop(&mut self) {
            let _ = std::fs::remove_file(&self.0);
        }
    }

    #[test]
    fn own_line_yields_trimmed_neighbor_list() {
        let topo = TempTopology::write(
            "own-line",
            "127.0.0.1:5001 -> 127.0.0.1:5002 , 127.0.0.1:5003\n\
             127.0.0.1:5002 -> 127.0.0.1:5001\n",
        );

        assert_eq!(
            load_neighbors(&topo.0, "127.0.0.1:5001"),
            vec!["127.0.0.1:5002", "127.0.0.1:5003"]
        );
        assert_eq!(
            load_neighbors(&topo.0, "127.0.0.1:5002"),
            vec!["127.0.0.1:5001"]
        );
    }

    #[test]
    fn unknown_identifier_is_isolated() {
        let topo = TempTopology::write("unknown-id", "127.0.0.1:5001 -> 127.0.0.1:5002\n");
        assert!(load_neighbors(&topo.0, "127.0.0.1:9999").is_empty());
    }

    #[test]
    fn missing_file_is_isolated() {
        assert!(load_neighbors("/nonexistent/topology.dat", "a:1").is_empty());
    }

    #[test]
    fn malformed_and_blank_lines_are_skipped() {
        let topo = TempTopology::write(
            "malformed",
            "\n   \nnot a topology line\n127.0.0.1:5001 -> 127.0.0.1:5002\n",
        );
        assert_eq!(
            load_neighbors(&topo.0, "127.0.0.1:5001"),
            vec!["127.0.0.1:5002"]
        );
    }
}
