use crate::error::{PipelineError, TableError};
use crate::table_store::TableStore;
use std::io::{Cursor, Read};
use tracing::{debug, instrument};
use zip::ZipArchive;

/// Pulls a single named entry out of a zip archive stored in the bucket
#[derive(Clone)]
pub struct ArchiveExtractor {
    tables: TableStore,
}

impl ArchiveExtractor {
    pub fn new(tables: TableStore) -> Self {
        Self { tables }
    }

    /// Fetch the archive and return the bytes of `entry_name`, if present
    #[instrument(skip(self))]
    pub async fn extract_entry(
        &self,
        bucket: &str,
        key: &str,
        entry_name: &str,
    ) -> Result<Option<Vec<u8>>, PipelineError> {
        let bytes = self.tables.read_bytes(bucket, key).await?;

        let entry = find_entry(&bytes, entry_name).map_err(|source| PipelineError::Parse {
            bucket: bucket.to_string(),
            key: key.to_string(),
            source,
        })?;

        debug!(found = entry.is_some(), "Searched archive for entry");
        Ok(entry)
    }
}

/// First file entry whose full name equals `entry_name`
pub fn find_entry(archive_bytes: &[u8], entry_name: &str) -> Result<Option<Vec<u8>>, TableError> {
    let mut archive = ZipArchive::new(Cursor::new(archive_bytes))?;

    for i in 0..archive.len() {
        let mut file = archive.by_index(i)?;
        if file.is_file() && file.name() == entry_name {
            let mut buf = Vec::new();
            file.read_to_end(&mut buf)?;
            return Ok(Some(buf));
        }
    }

    Ok(None)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::object_store::memory::InMemoryObjectStore;
    use std::io::Write;
    use std::sync::Arc;
    use zip::write::SimpleFileOptions;
    use zip::CompressionMethod;

    /// Deflated zip with the given entries, in order
    pub(crate) fn zip_bytes(entries: &[(&str, &str)]) -> Vec<u8> {
        let mut buf = Vec::new();
        {
            let mut zip = zip::ZipWriter::new(Cursor::new(&mut buf));
            let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);
            for (name, content) in entries {
                zip.start_file(*name, options).unwrap();
                zip.write_all(content.as_bytes()).unwrap();
            }
            zip.finish().unwrap();
        }
        buf
    }

    #[test]
    fn test_find_entry_exact_name() {
        let bytes = zip_bytes(&[("notes.txt", "hello"), ("data/sales.csv", "id\n1\n")]);

        assert_eq!(find_entry(&bytes, "data/sales.csv").unwrap(), Some(b"id\n1\n".to_vec()));
        assert_eq!(find_entry(&bytes, "sales.csv").unwrap(), None);
    }

    #[test]
    fn test_find_entry_skips_directories() {
        let mut buf = Vec::new();
        {
            let mut zip = zip::ZipWriter::new(Cursor::new(&mut buf));
            zip.add_directory("report.csv/", SimpleFileOptions::default()).unwrap();
            zip.start_file("nested/report.csv", SimpleFileOptions::default()).unwrap();
            zip.write_all(b"id\n").unwrap();
            zip.finish().unwrap();
        }

        assert_eq!(find_entry(&buf, "report.csv/").unwrap(), None);
        assert_eq!(find_entry(&buf, "nested/report.csv").unwrap(), Some(b"id\n".to_vec()));
    }

    #[test]
    fn test_find_entry_ignores_declared_size() {
        let mut buf = Vec::new();
        {
            let mut zip = zip::ZipWriter::new(Cursor::new(&mut buf));
            let options = SimpleFileOptions::default().compression_method(CompressionMethod::Stored);
            zip.start_file("big.csv", options).unwrap();
            zip.write_all(b"id\n1\n").unwrap();
            zip.finish().unwrap();
        }

        // Claim ~4 GiB uncompressed in the central directory header
        let header = buf.windows(4).position(|w| w == b"PK\x01\x02").unwrap();
        buf[header + 24..header + 28].copy_from_slice(&0xFFFF_FFF0u32.to_le_bytes());

        assert_eq!(find_entry(&buf, "big.csv").unwrap(), Some(b"id\n1\n".to_vec()));
    }

    #[test]
    fn test_find_entry_rejects_non_archive() {
        assert!(matches!(find_entry(b"id,name\n", "a.csv"), Err(TableError::Archive(_))));
    }

    #[tokio::test]
    async fn test_extract_entry_from_store() {
        let store = InMemoryObjectStore::new();
        store.insert("uploads", "batch.zip", zip_bytes(&[("batch.csv", "id\n1\n2\n")]));
        let extractor = ArchiveExtractor::new(TableStore::new(Arc::new(store)));

        let entry = extractor.extract_entry("uploads", "batch.zip", "batch.csv").await.unwrap();
        assert_eq!(entry, Some(b"id\n1\n2\n".to_vec()));

        let missing = extractor.extract_entry("uploads", "batch.zip", "other.csv").await.unwrap();
        assert_eq!(missing, None);
    }

    #[tokio::test]
    async fn test_extract_entry_missing_archive_is_storage_read_error() {
        let extractor = ArchiveExtractor::new(TableStore::new(Arc::new(InMemoryObjectStore::new())));

        assert!(matches!(
            extractor.extract_entry("uploads", "gone.zip", "gone.csv").await,
            Err(PipelineError::StorageRead { .. })
        ));
    }
}
