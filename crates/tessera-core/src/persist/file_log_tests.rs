//! Tests for file-backed edit log

#[cfg(test)]
mod tests {
    use crate::catalog::Backend;
    use crate::persist::{EditLog, EditLogEntry, FileEditLog, MemoryEditLog, ReplicaPersistInfo};
    use std::fs::OpenOptions;
    use std::io::Write;
    use tempfile::TempDir;

    fn add_replica(replica_id: u64) -> EditLogEntry {
        EditLogEntry::AddReplica(ReplicaPersistInfo {
            db_id: 1,
            table_id: 2,
            partition_id: 3,
            index_id: 2,
            tablet_id: 4,
            backend_id: 5,
            replica_id,
            version: 7,
            version_hash: 70,
            data_size: 1024,
            row_count: 10,
        })
    }

    // ========================================================================
    // FileEditLog
    // ========================================================================

    #[test]
    fn test_replay_empty_directory() {
        let dir = TempDir::new().unwrap();
        let log = FileEditLog::open(dir.path(), false).unwrap();

        assert!(log.replay().unwrap().is_empty());
    }

    #[test]
    fn test_append_then_replay_in_order() {
        // Arrange
        let dir = TempDir::new().unwrap();
        let log = FileEditLog::open(dir.path(), true).unwrap();

        // Act
        log.append(&EditLogEntry::CreateDatabase {
            db_id: 1,
            name: "db1".to_string(),
        })
        .unwrap();
        log.append(&EditLogEntry::AddBackend(Backend::new(5, "be1", 9050)))
            .unwrap();
        log.append(&add_replica(100)).unwrap();

        // Assert
        let entries = log.replay().unwrap();
        assert_eq!(entries.len(), 3);
        assert_eq!(entries[0].kind(), "create_database");
        assert_eq!(entries[1].kind(), "add_backend");
        assert_eq!(entries[2], add_replica(100));
    }

    #[test]
    fn test_reopen_appends_after_existing_entries() {
        let dir = TempDir::new().unwrap();
        {
            let log = FileEditLog::open(dir.path(), false).unwrap();
            log.append(&add_replica(1)).unwrap();
        }

        let log = FileEditLog::open(dir.path(), false).unwrap();
        log.append(&add_replica(2)).unwrap();

        let entries = log.replay().unwrap();
        assert_eq!(entries, vec![add_replica(1), add_replica(2)]);
    }

    #[test]
    fn test_torn_tail_is_ignored() {
        // Arrange
        let dir = TempDir::new().unwrap();
        let log = FileEditLog::open(dir.path(), false).unwrap();
        log.append(&add_replica(1)).unwrap();
        log.append(&add_replica(2)).unwrap();

        // Act: a crash left half a header behind
        let mut file = OpenOptions::new().append(true).open(log.path()).unwrap();
        file.write_all(&[0x20, 0x00]).unwrap();

        // Assert
        assert_eq!(log.replay().unwrap().len(), 2);
    }

    #[test]
    fn test_appends_after_torn_tail_survive_restart() {
        // Arrange: a crash left a partial frame behind record 1
        let dir = TempDir::new().unwrap();
        {
            let log = FileEditLog::open(dir.path(), false).unwrap();
            log.append(&add_replica(1)).unwrap();
            let mut file = OpenOptions::new().append(true).open(log.path()).unwrap();
            file.write_all(&64u32.to_le_bytes()).unwrap();
            file.write_all(&0u32.to_le_bytes()).unwrap();
            file.write_all(&[1, 2, 3]).unwrap();
        }

        // Act: restart, append, restart again
        {
            let log = FileEditLog::open(dir.path(), false).unwrap();
            assert_eq!(log.replay().unwrap(), vec![add_replica(1)]);
            log.append(&add_replica(2)).unwrap();
            log.append(&add_replica(3)).unwrap();
        }
        let log = FileEditLog::open(dir.path(), false).unwrap();

        // Assert
        assert_eq!(
            log.replay().unwrap(),
            vec![add_replica(1), add_replica(2), add_replica(3)]
        );
    }

    #[test]
    fn test_open_cuts_corrupt_frame() {
        let dir = TempDir::new().unwrap();
        let good_len = {
            let log = FileEditLog::open(dir.path(), false).unwrap();
            log.append(&add_replica(1)).unwrap();
            let good_len = std::fs::metadata(log.path()).unwrap().len();
            log.append(&add_replica(2)).unwrap();
            good_len
        };
        let path = dir.path().join(crate::persist::EDIT_LOG_FILE);
        let mut bytes = std::fs::read(&path).unwrap();
        let last = bytes.len() - 1;
        bytes[last] ^= 0xff;
        std::fs::write(&path, &bytes).unwrap();

        let log = FileEditLog::open(dir.path(), false).unwrap();

        assert_eq!(std::fs::metadata(log.path()).unwrap().len(), good_len);
        log.append(&add_replica(3)).unwrap();
        assert_eq!(log.replay().unwrap(), vec![add_replica(1), add_replica(3)]);
    }

    #[test]
    fn test_truncated_payload_is_ignored() {
        let dir = TempDir::new().unwrap();
        let log = FileEditLog::open(dir.path(), false).unwrap();
        log.append(&add_replica(1)).unwrap();

        let mut file = OpenOptions::new().append(true).open(log.path()).unwrap();
        file.write_all(&64u32.to_le_bytes()).unwrap();
        file.write_all(&0u32.to_le_bytes()).unwrap();
        file.write_all(&[1, 2, 3]).unwrap();

        assert_eq!(log.replay().unwrap(), vec![add_replica(1)]);
    }

    #[test]
    fn test_checksum_mismatch_stops_replay() {
        // Arrange
        let dir = TempDir::new().unwrap();
        let log = FileEditLog::open(dir.path(), false).unwrap();
        log.append(&add_replica(1)).unwrap();
        let good_len = std::fs::metadata(log.path()).unwrap().len();
        log.append(&add_replica(2)).unwrap();

        // Act: flip the last payload byte of the second frame
        let mut bytes = std::fs::read(log.path()).unwrap();
        let last = bytes.len() - 1;
        bytes[last] ^= 0xff;
        std::fs::write(log.path(), &bytes).unwrap();

        // Assert
        let entries = log.replay().unwrap();
        assert_eq!(entries, vec![add_replica(1)]);
        assert!(good_len > 0);
    }

    // ========================================================================
    // MemoryEditLog
    // ========================================================================

    #[test]
    fn test_memory_log_round_trip() {
        let log = MemoryEditLog::new();
        assert!(log.is_empty());

        log.log_add_replica(&match add_replica(9) {
            EditLogEntry::AddReplica(info) => info,
            _ => unreachable!(),
        })
        .unwrap();

        assert_eq!(log.len(), 1);
        assert_eq!(log.replay().unwrap(), vec![add_replica(9)]);
    }

    #[test]
    fn test_memory_log_rejects_when_failing() {
        let log = MemoryEditLog::new();
        log.set_fail_appends(true);

        let err = log.append(&add_replica(1)).unwrap_err();

        assert_eq!(err.code(), "TESS-012");
        assert!(log.is_empty());
    }
}
