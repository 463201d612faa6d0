//! Per-image extraction loop.
//!
//! For each container family: load the store, skip if the record exists,
//! start the image, probe it, derive family fields, merge and save. The
//! container is released before the next image starts.

use std::path::PathBuf;

use crate::catalog::{self, ImageRef, CONTAINERS};
use crate::config::Snippets;
use crate::container::{acquire, Acquisition, ContainerRuntime};
use crate::error::Result;
use crate::probe::{ExitPolicy, Prober};
use crate::store::{RecordKey, RecordStore};

/// Options for one extraction run.
#[derive(Debug, Clone)]
pub struct RunOptions {
    /// Release tag probed, e.g. `22.03`.
    pub release: String,

    /// Store file path.
    pub store_path: PathBuf,

    /// Restrict the run to one container family.
    pub container: Option<String>,

    /// Reprocess records that are already present.
    pub force: bool,

    /// How exec status codes are judged.
    pub policy: ExitPolicy,
}

/// What happened to one image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImageOutcome {
    /// Probed and written to the store.
    Recorded,

    /// A non-empty record exists and the run is not forced.
    AlreadyPresent,

    /// The image does not exist in the registry.
    NotFound,

    /// The container could not be started.
    StartFailed(String),
}

/// Summary of a run, one entry per image in processing order.
#[derive(Debug, Default)]
pub struct RunReport {
    pub images: Vec<(ImageRef, ImageOutcome)>,
}

impl RunReport {
    /// Number of images written to the store.
    pub fn recorded(&self) -> usize {
        self.count(|o| *o == ImageOutcome::Recorded)
    }

    pub fn skipped(&self) -> usize {
        self.count(|o| *o == ImageOutcome::AlreadyPresent)
    }

    /// Number of images that could not be started, missing or otherwise.
    pub fn unavailable(&self) -> usize {
        self.count(|o| matches!(o, ImageOutcome::NotFound | ImageOutcome::StartFailed(_)))
    }

    fn count(&self, pred: impl Fn(&ImageOutcome) -> bool) -> usize {
        self.images.iter().filter(|(_, o)| pred(o)).count()
    }
}

/// Drives the extraction of every selected image.
pub struct Extractor<'a> {
    runtime: &'a dyn ContainerRuntime,
    snippets: &'a Snippets,
    options: &'a RunOptions,
}

impl<'a> Extractor<'a> {
    pub fn new(
        runtime: &'a dyn ContainerRuntime,
        snippets: &'a Snippets,
        options: &'a RunOptions,
    ) -> Self {
        Self {
            runtime,
            snippets,
            options,
        }
    }

    /// Container families selected for this run.
    pub fn families(&self) -> Vec<&str> {
        match &self.options.container {
            Some(name) => vec![name.as_str()],
            None => CONTAINERS.to_vec(),
        }
    }

    /// Process every selected image in order.
    ///
    /// Missing or unstartable images are skipped. Store errors abort the
    /// run; records saved before the error stay on disk.
    pub fn run(&self) -> Result<RunReport> {
        let mut report = RunReport::default();
        for family in self.families() {
            let image = ImageRef::for_family(family, &self.options.release);
            let outcome = self.process(family, &image)?;
            report.images.push((image, outcome));
        }
        Ok(report)
    }

    /// Extract one image into the store.
    pub fn process(&self, family: &str, image: &ImageRef) -> Result<ImageOutcome> {
        tracing::info!("Extracting information from: {}", image);

        let key = RecordKey::new(image.repository.as_str(), image.tag.as_str());
        let mut store = RecordStore::load(&self.options.store_path, &key, self.options.force)?;

        if store.already_present(&key) && !self.options.force {
            tracing::info!("...skipping because container is already in data.");
            return Ok(ImageOutcome::AlreadyPresent);
        }

        let container = match acquire(self.runtime, &image.to_string()) {
            Acquisition::Acquired(container) => container,
            Acquisition::NotFound => {
                tracing::info!("...image is not found.");
                return Ok(ImageOutcome::NotFound);
            }
            Acquisition::OtherFailure(detail) => {
                tracing::info!("...container failed to start: {}", detail);
                return Ok(ImageOutcome::StartFailed(detail));
            }
        };
        tracing::info!("...container is running.");

        let mut prober = Prober::new(&container, self.options.policy);
        for (key, text) in self.snippets.standard() {
            prober.insert(key, text);
        }
        prober.insert("release", self.options.release.as_str());
        prober.run(&catalog::standard_plan());

        let base = catalog::base_container(family, prober.record());
        prober.insert("base_container", base);

        let record = prober.into_record();
        tracing::debug!("{:?}", record);

        store.replace(&key, record);
        store.save()?;
        Ok(ImageOutcome::Recorded)
    }
}
