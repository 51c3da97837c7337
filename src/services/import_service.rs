use crate::database::question_store::QuestionStore;
use crate::error::{Error, Result};
use crate::models::question::{NewQuestion, QuestionKey, IMAGE_DIR_NAME};
use crate::services::image_cache::ImageCache;
use crate::services::image_extractor::ImageExtractor;
use crate::services::workbook::SheetSnapshot;
use bytes::Bytes;
use chrono::Utc;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Columns read from every data row, in sheet order.
pub const QUESTION_COLUMNS: usize = 9;

/// What to do with an imported row whose (subject, topic, question text)
/// already exists.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DuplicatePolicy {
    /// Insert anyway.
    Allow,
    /// Fail the whole import.
    Reject,
    /// Keep the stored row and drop the incoming one.
    Merge,
}

impl std::str::FromStr for DuplicatePolicy {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "allow" => Ok(DuplicatePolicy::Allow),
            "reject" => Ok(DuplicatePolicy::Reject),
            "merge" | "skip" => Ok(DuplicatePolicy::Merge),
            other => Err(format!("unknown duplicate policy '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ImportSummary {
    pub rows_read: usize,
    pub imported: usize,
    pub skipped: usize,
    pub images_written: usize,
    pub images_reused: usize,
    pub question_ids: Vec<i32>,
}

#[derive(Clone)]
pub struct ImportService {
    store: Arc<dyn QuestionStore>,
    cache: ImageCache,
    asset_root: PathBuf,
    created_by: i32,
    duplicate_policy: DuplicatePolicy,
}

struct ExtractedRows {
    rows: Vec<NewQuestion>,
    images_written: usize,
    images_reused: usize,
}

impl ImportService {
    pub fn new(
        store: Arc<dyn QuestionStore>,
        cache: ImageCache,
        asset_root: impl Into<PathBuf>,
        created_by: i32,
        duplicate_policy: DuplicatePolicy,
    ) -> Self {
        Self {
            store,
            cache,
            asset_root: asset_root.into(),
            created_by,
            duplicate_policy,
        }
    }

    pub fn images_dir(&self) -> PathBuf {
        self.asset_root.join(IMAGE_DIR_NAME)
    }

    /// Reads every data row of the first worksheet and persists the result in
    /// a single transaction. Nothing is stored if any row fails.
    pub async fn import_workbook(&self, bytes: Bytes) -> Result<ImportSummary> {
        let images_dir = self.images_dir();
        let cache = self.cache.clone();
        let created_by = self.created_by;

        let extracted = tokio::task::spawn_blocking(move || {
            extract_workbook(&bytes, &cache, &images_dir, created_by)
        })
        .await??;

        let rows_read = extracted.rows.len();
        let (rows, skipped) = self.apply_duplicate_policy(extracted.rows).await?;
        let question_ids = self.store.insert_all(&rows).await?;

        let summary = ImportSummary {
            rows_read,
            imported: question_ids.len(),
            skipped,
            images_written: extracted.images_written,
            images_reused: extracted.images_reused,
            question_ids,
        };

        tracing::info!(
            rows_read = summary.rows_read,
            imported = summary.imported,
            skipped = summary.skipped,
            images_written = summary.images_written,
            images_reused = summary.images_reused,
            "Bulk question import finished"
        );

        Ok(summary)
    }

    async fn apply_duplicate_policy(
        &self,
        rows: Vec<NewQuestion>,
    ) -> Result<(Vec<NewQuestion>, usize)> {
        if self.duplicate_policy == DuplicatePolicy::Allow {
            return Ok((rows, 0));
        }

        let keys: Vec<QuestionKey> = rows.iter().map(NewQuestion::key).collect();
        let mut seen: HashSet<QuestionKey> = self.store.existing_keys(&keys).await?;
        let mut kept = Vec::with_capacity(rows.len());
        let mut skipped = 0;

        for (idx, row) in rows.into_iter().enumerate() {
            let key = row.key();
            if seen.contains(&key) {
                if self.duplicate_policy == DuplicatePolicy::Reject {
                    return Err(Error::Validation(format!(
                        "Row {} duplicates an existing question: {}",
                        idx + 2,
                        key.question_text
                    )));
                }
                tracing::debug!(row = idx + 2, "Skipping duplicate question");
                skipped += 1;
                continue;
            }
            seen.insert(key);
            kept.push(row);
        }

        Ok((kept, skipped))
    }
}

fn extract_workbook(
    bytes: &[u8],
    cache: &ImageCache,
    images_dir: &Path,
    created_by: i32,
) -> Result<ExtractedRows> {
    std::fs::create_dir_all(images_dir)?;

    let sheet = SheetSnapshot::from_xlsx(bytes)?;
    let extractor = ImageExtractor::new(cache, images_dir);
    let rows = extract_questions(&sheet, &extractor, created_by)?;

    Ok(ExtractedRows {
        rows,
        images_written: extractor.images_written(),
        images_reused: extractor.images_reused(),
    })
}

/// Row 1 is the header; rows 2..=N each become one question.
pub fn extract_questions(
    sheet: &SheetSnapshot,
    extractor: &ImageExtractor<'_>,
    created_by: i32,
) -> Result<Vec<NewQuestion>> {
    let mut rows = Vec::new();

    for row in 2..=sheet.row_count() {
        let mut fields: [String; QUESTION_COLUMNS] = Default::default();
        for (idx, field) in fields.iter_mut().enumerate() {
            *field = extractor.extract(sheet, row, idx as u32 + 1)?;
        }
        let [subject, topic, difficulty_level, question_text, option_a, option_b, option_c, option_d, correct_answer] =
            fields;
        let now = Utc::now();

        rows.push(NewQuestion {
            subject,
            topic,
            difficulty_level,
            question_text,
            option_a,
            option_b,
            option_c,
            option_d,
            correct_answer,
            created_by,
            created_at: now,
            updated_at: now,
        });
    }

    Ok(rows)
}
