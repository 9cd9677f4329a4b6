//! `.npz` containers: a zip archive holding one `.npy` entry per array.

use std::{
    collections::{BTreeMap, BTreeSet},
    fs::File,
    io::{BufReader, BufWriter, Read, Seek, Write},
    path::Path,
};

use zip::{CompressionMethod, ZipArchive, ZipWriter, write::SimpleFileOptions};

use crate::{NpyHeader, NpyReader, NpyWriter, NpzError};

const ENTRY_SUFFIX: &str = ".npy";

#[derive(Debug, Clone)]
struct Entry {
    name: String,
    header: NpyHeader,
}

/// A readable archive whose array headers were all parsed on open.
pub struct NpzArchive<R> {
    zip: ZipArchive<R>,
    entries: BTreeMap<String, Entry>,
}

impl NpzArchive<BufReader<File>> {
    /// Opens the archive stored at `path`.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, NpzError> {
        let file = File::open(path)?;
        Self::new(BufReader::new(file))
    }
}

impl<R: Read + Seek> NpzArchive<R> {
    /// Indexes every array in the archive held by `reader`.
    ///
    /// The array key is the entry name without its `.npy` suffix.
    ///
    /// # Errors
    /// Returns `NpzError::Zip` if the container is unreadable and the header
    /// errors of `NpyHeader::read` if any entry is not a supported array.
    pub fn new(reader: R) -> Result<Self, NpzError> {
        let mut zip = ZipArchive::new(reader)?;
        let mut entries = BTreeMap::new();

        for i in 0..zip.len() {
            let mut file = zip.by_index(i)?;
            if file.is_dir() {
                continue;
            }

            let name = file.name().to_string();
            let key = name.strip_suffix(ENTRY_SUFFIX).unwrap_or(&name).to_string();
            let header = NpyHeader::read(&mut file)?;

            entries.insert(key, Entry { name, header });
        }

        Ok(Self { zip, entries })
    }

    /// Opens a streaming reader over the elements of `key`.
    ///
    /// # Errors
    /// Returns `NpzError::MissingKey` if the archive has no such array.
    pub fn array_reader(&mut self, key: &str) -> Result<NpyReader<impl Read + '_>, NpzError> {
        let entry = self
            .entries
            .get(key)
            .ok_or_else(|| NpzError::MissingKey(key.to_string()))?;

        let file = self.zip.by_name(&entry.name)?;
        NpyReader::new(BufReader::new(file))
    }

    /// Streams through every element of every array, checking each data
    /// section holds as many elements as its shape declares.
    ///
    /// # Errors
    /// Returns `NpzError::EndOfArray` for truncated data, or any read failure.
    pub fn verify(&mut self) -> Result<(), NpzError> {
        let keys: Vec<String> = self.entries.keys().cloned().collect();

        for key in keys {
            let mut reader = self.array_reader(&key)?;
            while reader.next_value()?.is_some() {}
        }

        Ok(())
    }

    /// Reads the whole array `key` into memory.
    pub fn read_array(&mut self, key: &str) -> Result<Vec<f64>, NpzError> {
        self.array_reader(key)?.read_all()
    }
}

impl<R> NpzArchive<R> {
    /// The array keys, in sorted order.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    pub fn header(&self, key: &str) -> Option<&NpyHeader> {
        self.entries.get(key).map(|entry| &entry.header)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Checks that `other` has the same keys and the same shape per key.
    ///
    /// # Errors
    /// Returns `NpzError::ShapeMismatch` naming the first offending key.
    pub fn check_congruent<S>(&self, other: &NpzArchive<S>) -> Result<(), NpzError> {
        let mismatch = |key: &str| NpzError::ShapeMismatch {
            key: key.to_string(),
        };

        if let Some(key) = other.keys().find(|key| !self.entries.contains_key(*key)) {
            return Err(mismatch(key));
        }

        for (key, entry) in &self.entries {
            match other.header(key) {
                Some(header) if header.shape == entry.header.shape => {}
                _ => return Err(mismatch(key)),
            }
        }

        Ok(())
    }
}

/// A writable archive, every array is stored uncompressed.
pub struct NpzWriter<W: Write + Seek> {
    zip: ZipWriter<W>,
    keys: BTreeSet<String>,
}

impl NpzWriter<BufWriter<File>> {
    /// Creates or truncates the archive at `path`.
    pub fn create<P: AsRef<Path>>(path: P) -> Result<Self, NpzError> {
        let file = File::create(path)?;
        Ok(Self::new(BufWriter::new(file)))
    }
}

impl<W: Write + Seek> NpzWriter<W> {
    pub fn new(writer: W) -> Self {
        Self {
            zip: ZipWriter::new(writer),
            keys: BTreeSet::new(),
        }
    }

    /// Starts a new array entry named `key`.
    ///
    /// The returned writer must be finished before the next entry is started.
    ///
    /// # Errors
    /// Returns `NpzError::Format` if `key` was already written.
    pub fn array_writer(
        &mut self,
        key: &str,
        header: NpyHeader,
    ) -> Result<NpyWriter<BufWriter<&mut ZipWriter<W>>>, NpzError> {
        if !self.keys.insert(key.to_string()) {
            return Err(NpzError::format(format!("duplicate array key {key:?}")));
        }

        let options = SimpleFileOptions::default()
            .compression_method(CompressionMethod::Stored)
            .large_file(true);
        self.zip.start_file(format!("{key}{ENTRY_SUFFIX}"), options)?;

        NpyWriter::new(BufWriter::new(&mut self.zip), header)
    }

    /// Writes a whole array at once.
    pub fn write_array(
        &mut self,
        key: &str,
        header: NpyHeader,
        values: &[f64],
    ) -> Result<(), NpzError> {
        let mut writer = self.array_writer(key, header)?;
        for &value in values {
            writer.write_value(value)?;
        }

        writer.finish()?;
        Ok(())
    }

    /// Writes the central directory.
    ///
    /// # Returns
    /// The underlying writer.
    pub fn finish(self) -> Result<W, NpzError> {
        let mut inner = self.zip.finish()?;
        inner.flush()?;
        Ok(inner)
    }
}
