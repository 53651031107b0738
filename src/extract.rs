//! Extraction driver: build the identifier index, stream the FASTQ file, keep
//! or drop each record.
//!
//! A pass runs `BuildIndex → StreamAndFilter → Teardown`. The index and every
//! file handle are owned values, so teardown happens on every exit path,
//! including a failed build or a malformed input.

use std::fs::File;
use std::io::{self, BufWriter, Read, Write};
use std::path::Path;

use log::{debug, info, warn};

use crate::avl::IdTree;
use crate::bignum::BigNum;
use crate::cursor::IdListReader;
use crate::error::{Error, FileRole, Result};
use crate::fastq::FastqReader;
use crate::hash::IdHashTable;
use crate::ExtractConfig;

/// Membership index over the filter identifiers.
#[derive(Debug)]
pub enum IdIndex {
    Tree(IdTree),
    Hash(IdHashTable),
}

impl IdIndex {
    /// Read a filter list to its end and index it.
    pub fn read<R: Read>(reader: R, config: &ExtractConfig) -> Result<Self> {
        let mut ids = IdListReader::with_capacity(reader, config.buffer_capacity);

        let index = if config.use_hash {
            // The table is sized from the count, so collect first.
            let mut all = Vec::new();
            while let Some(id) = ids.next_id()? {
                all.try_reserve(1)
                    .map_err(|_| Error::OutOfMemory("identifier list"))?;
                all.push(id);
            }
            Self::Hash(IdHashTable::from_ids(all, config.hash_mode)?)
        } else {
            let mut tree = IdTree::new();
            while let Some(id) = ids.next_id()? {
                tree.insert(id)?;
            }
            Self::Tree(tree)
        };

        if ids.ignored_lines() > 0 {
            debug!(
                "ignored {} filter lines without a hex identifier",
                ids.ignored_lines()
            );
        }
        index.log_stats();
        Ok(index)
    }

    /// Index an in-memory list.
    pub fn from_ids(ids: Vec<BigNum>, config: &ExtractConfig) -> Result<Self> {
        let index = if config.use_hash {
            Self::Hash(IdHashTable::from_ids(ids, config.hash_mode)?)
        } else {
            Self::Tree(IdTree::from_ids(ids)?)
        };
        index.log_stats();
        Ok(index)
    }

    fn log_stats(&self) {
        match self {
            IdIndex::Tree(tree) => debug!(
                "built identifier tree: {} ids, height {}",
                tree.len(),
                tree.height()
            ),
            IdIndex::Hash(table) => debug!(
                "built identifier hash table: {} ids, {}/{} buckets used, deepest bucket {}",
                table.len(),
                table.occupied_buckets(),
                table.bucket_count(),
                table.max_bucket_depth()
            ),
        }
    }

    #[inline]
    pub fn contains(&self, id: &BigNum) -> bool {
        match self {
            IdIndex::Tree(tree) => tree.contains(id),
            IdIndex::Hash(table) => table.contains(id),
        }
    }

    pub fn len(&self) -> usize {
        match self {
            IdIndex::Tree(tree) => tree.len(),
            IdIndex::Hash(table) => table.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Counters for one pass.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ExtractStats {
    /// Records read from the FASTQ input.
    pub records: u64,
    /// Records written to the output.
    pub emitted: u64,
    /// Records dropped.
    pub skipped: u64,
}

/// Stream `fastq` into `out`, keeping the records selected by `index` and the
/// configured polarity.
///
/// On malformed input the pass stops with [`Error::InvalidFastq`]; every
/// record written before that point is complete.
pub fn extract<R: Read, W: Write>(
    index: &IdIndex,
    fastq: R,
    mut out: W,
    config: &ExtractConfig,
) -> Result<ExtractStats> {
    let mut reader = FastqReader::with_capacity(fastq, config.buffer_capacity)
        .require_header_marker(config.require_header_marker);
    let mut stats = ExtractStats::default();

    let result = (|| -> Result<()> {
        while let Some(record) = reader.next_record()? {
            stats.records += 1;
            if index.contains(record.id()) != config.keep_complement {
                record.emit(&mut out)?;
                stats.emitted += 1;
            } else {
                record.skip()?;
                stats.skipped += 1;
            }
        }
        Ok(())
    })();

    match result {
        Ok(()) => {
            info!(
                "{} records read, {} emitted, {} skipped",
                stats.records, stats.emitted, stats.skipped
            );
            Ok(stats)
        }
        Err(e) => {
            warn!(
                "extraction stopped after {} records ({} emitted): {}",
                stats.records, stats.emitted, e
            );
            Err(e)
        }
    }
}

fn open_error(role: FileRole, path: &Path) -> impl FnOnce(io::Error) -> Error + '_ {
    move |source| Error::Open {
        role,
        path: path.to_path_buf(),
        source,
    }
}

/// Full pass over files. `target = None` reads stdin, `output = None` writes
/// stdout.
///
/// All files are opened before any parsing starts. The output is flushed on
/// every path, so records emitted before an error stay in it.
pub fn extract_paths(
    filter: &Path,
    target: Option<&Path>,
    output: Option<&Path>,
    config: &ExtractConfig,
) -> Result<ExtractStats> {
    let filter_file = File::open(filter).map_err(open_error(FileRole::Filter, filter))?;
    let fastq: Box<dyn Read> = match target {
        Some(path) => Box::new(File::open(path).map_err(open_error(FileRole::Target, path))?),
        None => Box::new(io::stdin().lock()),
    };
    let sink: Box<dyn Write> = match output {
        Some(path) => Box::new(File::create(path).map_err(open_error(FileRole::Output, path))?),
        None => Box::new(io::stdout().lock()),
    };

    let index = IdIndex::read(filter_file, config)?;
    let mut out = BufWriter::new(sink);
    let result = extract(&index, fastq, &mut out, config);
    let flushed = out.flush();
    let stats = result?;
    flushed?;
    Ok(stats)
}
