use crate::database::question_store::QuestionStore;
use crate::error::{Error, Result};
use crate::models::question::{FieldContent, Question};
use crate::services::pdf_composer::{PageLayout, PdfComposer};
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

pub const PDF_CONTENT_TYPE: &str = "application/pdf";
pub const PDF_FILE_NAME: &str = "SelectedQuestions.pdf";

#[derive(Clone)]
pub struct DocumentService {
    store: Arc<dyn QuestionStore>,
    asset_root: PathBuf,
    layout: PageLayout,
}

impl DocumentService {
    pub fn new(store: Arc<dyn QuestionStore>, asset_root: impl Into<PathBuf>) -> Self {
        Self {
            store,
            asset_root: asset_root.into(),
            layout: PageLayout::default(),
        }
    }

    /// Renders one section per stored question among `ids`, in the order the
    /// store returns them. Ids with no row are ignored; if none match the
    /// call fails with `NotFound`.
    pub async fn render_questions(&self, ids: &[i32]) -> Result<Vec<u8>> {
        let questions = self.store.find_by_ids(ids).await?;
        if questions.is_empty() {
            return Err(Error::NotFound(
                "No questions found for the provided IDs.".to_string(),
            ));
        }

        tracing::info!(
            requested = ids.len(),
            matched = questions.len(),
            "Rendering question document"
        );

        let asset_root = self.asset_root.clone();
        let layout = self.layout;
        tokio::task::spawn_blocking(move || compose_document(&questions, &asset_root, layout))
            .await?
    }
}

pub fn compose_document(
    questions: &[Question],
    asset_root: &Path,
    layout: PageLayout,
) -> Result<Vec<u8>> {
    let mut composer = PdfComposer::new(layout);

    for question in questions {
        let fields = [
            ("Question", question.question_text.as_deref()),
            ("A", question.option_a.as_deref()),
            ("B", question.option_b.as_deref()),
            ("C", question.option_c.as_deref()),
            ("D", question.option_d.as_deref()),
        ];
        for (label, value) in fields {
            render_field(&mut composer, asset_root, label, value)?;
        }
        composer.push_blank_line();
    }

    composer.finish()
}

fn render_field(
    composer: &mut PdfComposer,
    asset_root: &Path,
    label: &str,
    value: Option<&str>,
) -> Result<()> {
    match FieldContent::classify(value) {
        FieldContent::Empty => composer.push_paragraph(&format!("{}: N/A", label)),
        FieldContent::Text(text) => composer.push_paragraph(&format!("{}: {}", label, text)),
        FieldContent::Image(reference) => {
            let path = match resolve_image_path(asset_root, reference) {
                Some(path) if path.is_file() => path,
                _ => {
                    tracing::warn!(image = %reference, "Referenced image is missing");
                    return composer.push_paragraph(&format!("{}: [Image not found]", label));
                }
            };
            let bytes = std::fs::read(&path)?;
            let image = image::load_from_memory(&bytes)?;
            composer.push_paragraph(&format!("{}:", label))?;
            composer.push_image(&image)
        }
    }
}

/// Maps a stored `Images/…` or `Images\…` reference onto the asset root.
/// References that try to leave the root resolve to nothing.
pub fn resolve_image_path(asset_root: &Path, reference: &str) -> Option<PathBuf> {
    let mut path = asset_root.to_path_buf();
    for part in reference.split(['/', '\\']).filter(|p| !p.is_empty()) {
        match Path::new(part).components().next() {
            Some(Component::Normal(_)) => path.push(part),
            _ => return None,
        }
    }
    Some(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::memory::MemoryQuestionStore;
    use crate::error::ErrorKind;
    use crate::models::question::NewQuestion;
    use chrono::Utc;
    use lopdf::Document;

    fn question(id: i32, text: Option<&str>, option_a: Option<&str>) -> Question {
        Question {
            question_id: id,
            subject: Some("Math".into()),
            topic: None,
            difficulty_level: None,
            question_text: text.map(String::from),
            option_a: option_a.map(String::from),
            option_b: Some("two".into()),
            option_c: Some("three".into()),
            option_d: None,
            correct_answer: Some("B".into()),
            created_by: Some(2),
            created_at: None,
            updated_at: None,
        }
    }

    fn all_text(bytes: &[u8]) -> String {
        let doc = Document::load_mem(bytes).unwrap();
        doc.get_pages()
            .values()
            .map(|id| String::from_utf8_lossy(&doc.get_page_content(*id).unwrap()).into_owned())
            .collect::<Vec<_>>()
            .join("\n")
    }

    fn write_png(root: &Path, name: &str) {
        let dir = root.join("Images");
        std::fs::create_dir_all(&dir).unwrap();
        let img = image::RgbImage::from_pixel(8, 4, image::Rgb([0, 0, 255]));
        img.save_with_format(dir.join(name), image::ImageFormat::Png).unwrap();
    }

    #[test]
    fn resolves_both_separators_under_root() {
        let root = Path::new("/srv/assets");
        assert_eq!(
            resolve_image_path(root, "Images\\a.png"),
            Some(PathBuf::from("/srv/assets/Images/a.png"))
        );
        assert_eq!(
            resolve_image_path(root, "Images/a.png"),
            Some(PathBuf::from("/srv/assets/Images/a.png"))
        );
        assert_eq!(resolve_image_path(root, "Images/../../etc/passwd"), None);
    }

    #[test]
    fn text_empty_and_image_fields() {
        let dir = tempfile::tempdir().unwrap();
        write_png(dir.path(), "pic.png");
        let q = question(1, Some("What is 2+2?"), Some("Images/pic.png"));

        let bytes = compose_document(&[q], dir.path(), PageLayout::default()).unwrap();
        let text = all_text(&bytes);
        assert!(text.contains("(Question: What is 2+2?) Tj"));
        assert!(text.contains("(A:) Tj"));
        assert!(text.contains("/Im1 Do"));
        assert!(text.contains("(B: two) Tj"));
        assert!(text.contains("(D: N/A) Tj"));
    }

    #[test]
    fn missing_image_renders_placeholder() {
        let dir = tempfile::tempdir().unwrap();
        let q = question(1, Some("Images\\gone.png"), Some("x"));

        let bytes = compose_document(&[q], dir.path(), PageLayout::default()).unwrap();
        let text = all_text(&bytes);
        assert!(text.contains("(Question: [Image not found]) Tj"));
        assert!(!text.contains(" Do"));
    }

    #[test]
    fn undecodable_image_aborts_render() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("Images")).unwrap();
        std::fs::write(dir.path().join("Images/bad.png"), b"not really a png").unwrap();
        let q = question(1, Some("Images/bad.png"), None);

        let err = compose_document(&[q], dir.path(), PageLayout::default()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Processing);
    }

    #[tokio::test]
    async fn unknown_ids_are_not_found() {
        let store = Arc::new(MemoryQuestionStore::new());
        let svc = DocumentService::new(store, "unused");

        let err = svc.render_questions(&[42]).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
        assert_eq!(err.to_string(), "No questions found for the provided IDs.");
    }

    #[tokio::test]
    async fn partially_matching_ids_render_what_exists() {
        let store = Arc::new(MemoryQuestionStore::new());
        let now = Utc::now();
        let row = |text: &str| NewQuestion {
            subject: "S".into(),
            topic: "T".into(),
            difficulty_level: "Easy".into(),
            question_text: text.into(),
            option_a: "a".into(),
            option_b: "b".into(),
            option_c: "c".into(),
            option_d: "d".into(),
            correct_answer: "A".into(),
            created_by: 2,
            created_at: now,
            updated_at: now,
        };
        store
            .insert_all(&[row("first"), row("second"), row("third")])
            .await
            .unwrap();
        let svc = DocumentService::new(store, "unused");

        let bytes = svc.render_questions(&[3, 99, 1]).await.unwrap();
        let text = all_text(&bytes);
        let first = text.find("(Question: first) Tj").unwrap();
        let third = text.find("(Question: third) Tj").unwrap();
        assert!(first < third);
        assert!(!text.contains("(Question: second) Tj"));
    }
}
