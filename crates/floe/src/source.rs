//! Input dataset resolution.
//!
//! A dataset's scan scope is resolved to an explicit file list before the
//! engine sees it: objects under the dataset path are listed and kept when a
//! scan pattern matches the file itself or one of its parent directories.

use datafusion::prelude::DataFrame;
use glob::{MatchOptions, Pattern};
use object_store::path::Path;
use snafu::prelude::*;
use tracing::{debug, info};

use floe_core::emit;
use floe_core::metrics::events::FilesScanned;

use crate::config::ScanScope;
use crate::engine::EngineSession;
use crate::error::{EmptyScanSnafu, ListSnafu, LoadSnafu, PatternSnafu, SourceError};

const MATCH_OPTIONS: MatchOptions = MatchOptions {
    case_sensitive: true,
    require_literal_separator: true,
    require_literal_leading_dot: false,
};

/// A dataset that can be loaded into the engine.
#[derive(Debug, Clone)]
pub struct DatasetSource {
    scope: ScanScope,
    patterns: Vec<Pattern>,
}

impl DatasetSource {
    pub fn new(scope: ScanScope) -> Result<Self, SourceError> {
        let patterns = scope
            .patterns
            .iter()
            .map(|pattern| Pattern::new(pattern).context(PatternSnafu { pattern }))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self { scope, patterns })
    }

    pub fn name(&self) -> &'static str {
        self.scope.dataset.name()
    }

    /// Whether `relative` (a path below the dataset directory) is in scope.
    fn selects(&self, relative: &str) -> bool {
        if !relative.ends_with(&self.scope.file_extension) {
            return false;
        }

        let mut candidate = relative;
        loop {
            if self
                .patterns
                .iter()
                .any(|pattern| pattern.matches_with(candidate, MATCH_OPTIONS))
            {
                return true;
            }
            match candidate.rfind('/') {
                Some(idx) => candidate = &candidate[..idx],
                None => return false,
            }
        }
    }

    /// List the files in scope, as paths relative to the input root.
    pub async fn resolve(&self, session: &EngineSession) -> Result<Vec<Path>, SourceError> {
        let storage = session.input();
        let prefix_parts = Path::from(self.scope.path.as_str()).parts().count();

        let listed = storage
            .list_with_prefix(&self.scope.path)
            .await
            .context(ListSnafu {
                dataset: self.name(),
            })?;
        let listed_count = listed.len();

        let files: Vec<Path> = listed
            .into_iter()
            .filter(|path| {
                let relative = path
                    .parts()
                    .skip(prefix_parts)
                    .map(|part| part.as_ref().to_string())
                    .collect::<Vec<_>>()
                    .join("/");
                self.selects(&relative)
            })
            .collect();

        debug!(
            dataset = self.name(),
            listed = listed_count,
            selected = files.len(),
            "Resolved scan scope"
        );

        ensure!(
            !files.is_empty(),
            EmptyScanSnafu {
                dataset: self.name(),
                url: storage.engine_url(&self.scope.path),
            }
        );

        emit!(FilesScanned {
            dataset: self.name(),
            count: files.len() as u64,
        });

        Ok(files)
    }

    /// Resolve the scan scope and register the records as view `view`.
    pub async fn load(&self, session: &EngineSession, view: &str) -> Result<DataFrame, SourceError> {
        let files = self.resolve(session).await?;
        let storage = session.input();

        info!(
            dataset = self.name(),
            view,
            files = files.len(),
            root = storage.canonical_url(),
            "Reading dataset"
        );

        let urls: Vec<String> = files
            .iter()
            .map(|path| storage.engine_url(path.as_ref()))
            .collect();

        let df = session
            .read_json(
                self.name(),
                urls,
                &self.scope.file_extension,
                self.scope.schema.as_deref(),
            )
            .await
            .context(LoadSnafu)?;
        session.register_view(view, df.clone()).context(LoadSnafu)?;

        Ok(df)
    }
}
