//! Compaction of many source files, optionally across a worker pool.
//!
//! Stateful compactors (see [`Compactor::is_stateful`](crate::write::Compactor::is_stateful))
//! record symbols while they run. In parallel mode every worker owns a
//! private [`SymbolRegistry`]; the registries are merged once all workers
//! have finished, so the result matches a sequential run.

use std::collections::BTreeMap;
use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};

use crate::Result;
use crate::write::{Compactors, SymbolRegistry};

/// Thread configuration for the parallel pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Threads {
    /// One thread per available CPU.
    #[default]
    Auto,
    /// A fixed number of threads.
    Count(NonZeroUsize),
    /// Single-threaded operation.
    Single,
}

impl Threads {
    /// Returns `Threads::Single` for zero, `Threads::Count(n)` otherwise.
    ///
    /// ```rust
    /// use pharbox::pipeline::Threads;
    ///
    /// assert_eq!(Threads::count_or_single(0), Threads::Single);
    /// assert_eq!(Threads::count_or_single(4).count(), 4);
    /// ```
    pub fn count_or_single(n: usize) -> Self {
        match NonZeroUsize::new(n) {
            Some(count) => Self::Count(count),
            None => Self::Single,
        }
    }

    /// Returns the resolved thread count, at least 1.
    pub fn count(&self) -> usize {
        match self {
            Self::Auto => std::thread::available_parallelism()
                .map(NonZeroUsize::get)
                .unwrap_or(1),
            Self::Count(n) => n.get(),
            Self::Single => 1,
        }
    }
}

/// Options for [`Pipeline`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PipelineOptions {
    /// Run compaction on a worker pool when the chain is stateful.
    pub parallel: bool,
    /// Worker count in parallel mode.
    pub threads: Threads,
}

impl PipelineOptions {
    /// Sequential options.
    pub fn new() -> Self {
        Self::default()
    }

    /// Enables or disables parallel mode.
    pub fn parallel(mut self, enabled: bool) -> Self {
        self.parallel = enabled;
        self
    }

    /// Sets the worker count.
    pub fn threads(mut self, threads: Threads) -> Self {
        self.threads = threads;
        self
    }
}

/// Output of a pipeline run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CompactedFiles {
    /// Compacted contents keyed by container path. When two sources map to
    /// the same path the later source in input order wins.
    pub files: BTreeMap<String, Vec<u8>>,
    /// Union of the symbols recorded by every worker.
    pub registry: SymbolRegistry,
}

impl CompactedFiles {
    fn push(&mut self, task: Compacted) {
        self.files.insert(task.local, task.contents);
        self.registry.merge(task.registry);
    }
}

struct Compacted {
    local: String,
    contents: Vec<u8>,
    registry: SymbolRegistry,
}

/// Reads and compacts source files.
#[derive(Debug, Clone)]
pub struct Pipeline {
    compactors: Compactors,
    options: PipelineOptions,
}

impl Pipeline {
    /// Creates a pipeline over a compactor chain.
    pub fn new(compactors: Compactors, options: PipelineOptions) -> Self {
        Self {
            compactors,
            options,
        }
    }

    /// Returns `true` if [`run`](Self::run) will use the worker pool.
    pub fn runs_parallel(&self) -> bool {
        self.options.parallel && cfg!(feature = "parallel") && self.compactors.is_stateful()
    }

    /// Reads every path, compacts it and maps it to its container path
    /// with `local_path`.
    ///
    /// # Errors
    ///
    /// The first read or compactor error aborts the run; results of tasks
    /// that already completed are discarded.
    pub fn run(
        &self,
        paths: &[PathBuf],
        local_path: &(dyn Fn(&str) -> String + Sync),
    ) -> Result<CompactedFiles> {
        if self.options.parallel && !cfg!(feature = "parallel") {
            log::warn!("parallel compaction requested but not compiled in, running sequentially");
        }
        if self.runs_parallel() {
            self.run_parallel(paths, local_path)
        } else {
            self.run_sequential(paths, local_path)
        }
    }

    fn run_sequential(
        &self,
        paths: &[PathBuf],
        local_path: &(dyn Fn(&str) -> String + Sync),
    ) -> Result<CompactedFiles> {
        let mut out = CompactedFiles::default();
        for path in paths {
            out.push(compact_one(&self.compactors, path, local_path)?);
        }
        log::debug!("compacted {} files sequentially", paths.len());
        Ok(out)
    }

    #[cfg(feature = "parallel")]
    fn run_parallel(
        &self,
        paths: &[PathBuf],
        local_path: &(dyn Fn(&str) -> String + Sync),
    ) -> Result<CompactedFiles> {
        let threads = self.options.threads.count();
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(threads)
            .build()
            .map_err(|e| crate::Error::ResourceLimitExceeded(format!("worker pool: {e}")))?;

        let (sender, receiver) = crossbeam_channel::unbounded();
        let compactors = &self.compactors;
        pool.scope(|scope| {
            for (index, path) in paths.iter().enumerate() {
                let sender = sender.clone();
                scope.spawn(move |_| {
                    let result = compact_one(compactors, path, local_path);
                    // The receiver outlives the scope.
                    let _ = sender.send((index, result));
                });
            }
        });
        drop(sender);

        let mut results: Vec<(usize, Result<Compacted>)> = receiver.iter().collect();
        results.sort_by_key(|(index, _)| *index);

        let mut out = CompactedFiles::default();
        for (_, result) in results {
            out.push(result?);
        }
        log::debug!("compacted {} files on {threads} workers", paths.len());
        Ok(out)
    }

    #[cfg(not(feature = "parallel"))]
    fn run_parallel(
        &self,
        paths: &[PathBuf],
        local_path: &(dyn Fn(&str) -> String + Sync),
    ) -> Result<CompactedFiles> {
        self.run_sequential(paths, local_path)
    }
}

fn compact_one(
    compactors: &Compactors,
    path: &Path,
    local_path: &(dyn Fn(&str) -> String + Sync),
) -> Result<Compacted> {
    let contents = std::fs::read(path)?;
    let source = path.to_string_lossy();
    let mut registry = SymbolRegistry::new();
    let contents = compactors.compact(&source, contents, &mut registry)?;
    Ok(Compacted {
        local: local_path(&source),
        contents,
        registry,
    })
}
