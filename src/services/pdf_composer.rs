use crate::error::Result;
use image::{DynamicImage, Rgb, RgbImage};
use lopdf::content::{Content, Operation};
use lopdf::{Dictionary, Document, Object, ObjectId, Stream};

/// Number of text lines an embedded image may occupy vertically.
pub const IMAGE_HEIGHT_LINES: f32 = 10.0;

#[derive(Debug, Clone, Copy)]
pub struct PageLayout {
    pub width: f32,
    pub height: f32,
    pub margin: f32,
    pub font_size: f32,
    pub leading: f32,
}

impl Default for PageLayout {
    /// A4 portrait, Helvetica 12 pt.
    fn default() -> Self {
        Self {
            width: 595.0,
            height: 842.0,
            margin: 36.0,
            font_size: 12.0,
            leading: 16.0,
        }
    }
}

impl PageLayout {
    pub fn content_width(&self) -> f32 {
        self.width - 2.0 * self.margin
    }

    pub fn image_budget(&self) -> f32 {
        self.leading * IMAGE_HEIGHT_LINES
    }

    /// Rough Helvetica capacity; glyphs average a bit over half an em.
    pub fn chars_per_line(&self) -> usize {
        (self.content_width() / (self.font_size * 0.55)).floor().max(1.0) as usize
    }

    /// Scales a `width`×`height` pixel image to the height budget, keeping
    /// its aspect ratio and never exceeding the content width.
    pub fn fit_image(&self, width: u32, height: u32) -> (f32, f32) {
        let aspect = width.max(1) as f32 / height.max(1) as f32;
        let mut h = self.image_budget();
        let mut w = h * aspect;
        if w > self.content_width() {
            w = self.content_width();
            h = w / aspect;
        }
        (w, h)
    }
}

/// Writes a flowing sequence of text lines and pictures onto as many pages
/// as it takes.
pub struct PdfComposer {
    doc: Document,
    layout: PageLayout,
    pages_id: ObjectId,
    font_id: ObjectId,
    page_ids: Vec<ObjectId>,
    operations: Vec<Operation>,
    page_images: Vec<(String, ObjectId)>,
    image_count: usize,
    cursor_y: f32,
}

impl PdfComposer {
    pub fn new(layout: PageLayout) -> Self {
        let mut doc = Document::with_version("1.5");
        let pages_id = doc.new_object_id();
        let font_id = doc.add_object(Dictionary::from_iter([
            ("Type", Object::Name(b"Font".to_vec())),
            ("Subtype", Object::Name(b"Type1".to_vec())),
            ("BaseFont", Object::Name(b"Helvetica".to_vec())),
            ("Encoding", Object::Name(b"WinAnsiEncoding".to_vec())),
        ]));

        Self {
            doc,
            layout,
            pages_id,
            font_id,
            page_ids: Vec::new(),
            operations: Vec::new(),
            page_images: Vec::new(),
            image_count: 0,
            cursor_y: layout.height - layout.margin,
        }
    }

    /// Adds `text` as one paragraph, wrapped to the content width.
    pub fn push_paragraph(&mut self, text: &str) -> Result<()> {
        for line in wrap_text(text, self.layout.chars_per_line()) {
            self.push_line(&line)?;
        }
        Ok(())
    }

    /// Vertical gap of one line. Never starts a page on its own.
    pub fn push_blank_line(&mut self) {
        self.cursor_y = (self.cursor_y - self.layout.leading).max(self.layout.margin);
    }

    pub fn push_image(&mut self, image: &DynamicImage) -> Result<()> {
        let (w, h) = self.layout.fit_image(image.width(), image.height());
        self.ensure_room(h)?;

        let rgb = flatten_onto_white(image);
        let (px_w, px_h) = rgb.dimensions();
        let stream = Stream::new(
            Dictionary::from_iter([
                ("Type", Object::Name(b"XObject".to_vec())),
                ("Subtype", Object::Name(b"Image".to_vec())),
                ("Width", Object::Integer(i64::from(px_w))),
                ("Height", Object::Integer(i64::from(px_h))),
                ("ColorSpace", Object::Name(b"DeviceRGB".to_vec())),
                ("BitsPerComponent", Object::Integer(8)),
            ]),
            rgb.into_raw(),
        );
        let image_id = self.doc.add_object(stream);

        self.image_count += 1;
        let name = format!("Im{}", self.image_count);
        self.page_images.push((name.clone(), image_id));

        self.cursor_y -= h;
        let x = self.layout.margin;
        let y = self.cursor_y;
        self.operations.extend([
            Operation::new("q", vec![]),
            Operation::new(
                "cm",
                vec![w.into(), Object::Integer(0), Object::Integer(0), h.into(), x.into(), y.into()],
            ),
            Operation::new("Do", vec![Object::Name(name.into_bytes())]),
            Operation::new("Q", vec![]),
        ]);
        Ok(())
    }

    /// Serializes the document. Always yields at least one page.
    pub fn finish(mut self) -> Result<Vec<u8>> {
        if !self.operations.is_empty() || self.page_ids.is_empty() {
            self.finish_page()?;
        }

        let kids: Vec<Object> = self.page_ids.iter().map(|&id| Object::Reference(id)).collect();
        let page_count = kids.len() as i64;
        self.doc.objects.insert(
            self.pages_id,
            Object::Dictionary(Dictionary::from_iter([
                ("Type", Object::Name(b"Pages".to_vec())),
                ("Kids", Object::Array(kids)),
                ("Count", Object::Integer(page_count)),
            ])),
        );

        let catalog_id = self.doc.add_object(Dictionary::from_iter([
            ("Type", Object::Name(b"Catalog".to_vec())),
            ("Pages", Object::Reference(self.pages_id)),
        ]));
        self.doc.trailer.set("Root", Object::Reference(catalog_id));
        self.doc.compress();

        let mut output = Vec::new();
        self.doc.save_to(&mut output)?;
        Ok(output)
    }

    fn push_line(&mut self, line: &str) -> Result<()> {
        self.ensure_room(self.layout.leading)?;
        self.cursor_y -= self.layout.leading;

        let baseline = self.cursor_y + (self.layout.leading - self.layout.font_size) / 2.0;
        self.operations.extend([
            Operation::new("BT", vec![]),
            Operation::new("Tf", vec!["F1".into(), self.layout.font_size.into()]),
            Operation::new("Td", vec![self.layout.margin.into(), baseline.into()]),
            Operation::new("Tj", vec![Object::string_literal(encode_win_ansi(line))]),
            Operation::new("ET", vec![]),
        ]);
        Ok(())
    }

    fn ensure_room(&mut self, needed: f32) -> Result<()> {
        if self.cursor_y - needed >= self.layout.margin {
            return Ok(());
        }
        if self.operations.is_empty() {
            self.cursor_y = self.top();
            return Ok(());
        }
        self.finish_page()
    }

    fn top(&self) -> f32 {
        self.layout.height - self.layout.margin
    }

    fn finish_page(&mut self) -> Result<()> {
        let content = Content {
            operations: std::mem::take(&mut self.operations),
        };
        let content_id = self
            .doc
            .add_object(Stream::new(Dictionary::new(), content.encode()?));

        let mut xobjects = Dictionary::new();
        for (name, id) in self.page_images.drain(..) {
            xobjects.set(name, Object::Reference(id));
        }
        let resources = Dictionary::from_iter([
            (
                "Font",
                Object::Dictionary(Dictionary::from_iter([(
                    "F1",
                    Object::Reference(self.font_id),
                )])),
            ),
            ("XObject", Object::Dictionary(xobjects)),
        ]);

        let page_id = self.doc.add_object(Dictionary::from_iter([
            ("Type", Object::Name(b"Page".to_vec())),
            ("Parent", Object::Reference(self.pages_id)),
            ("Contents", Object::Reference(content_id)),
            ("Resources", Object::Dictionary(resources)),
            (
                "MediaBox",
                Object::Array(vec![
                    Object::Integer(0),
                    Object::Integer(0),
                    self.layout.width.into(),
                    self.layout.height.into(),
                ]),
            ),
        ]));
        self.page_ids.push(page_id);
        self.cursor_y = self.top();
        Ok(())
    }
}

/// Splits on newlines, then word-wraps each line to `max_chars`, breaking
/// words that are longer than a whole line.
pub fn wrap_text(text: &str, max_chars: usize) -> Vec<String> {
    let max_chars = max_chars.max(1);
    let mut lines = Vec::new();

    for raw in text.split('\n') {
        let mut current = String::new();
        for word in raw.split_whitespace() {
            let mut word = word;
            while word.chars().count() > max_chars {
                if !current.is_empty() {
                    lines.push(std::mem::take(&mut current));
                }
                let split = word
                    .char_indices()
                    .nth(max_chars)
                    .map(|(i, _)| i)
                    .unwrap_or(word.len());
                lines.push(word[..split].to_string());
                word = &word[split..];
            }
            if word.is_empty() {
                continue;
            }

            let current_len = current.chars().count();
            let word_len = word.chars().count();
            if current_len > 0 && current_len + 1 + word_len > max_chars {
                lines.push(std::mem::take(&mut current));
            }
            if !current.is_empty() {
                current.push(' ');
            }
            current.push_str(word);
        }
        lines.push(current);
    }

    lines
}

/// The standard fonts only cover Latin-1; anything else becomes `?`.
fn encode_win_ansi(text: &str) -> Vec<u8> {
    text.chars()
        .map(|c| match c as u32 {
            0..=0x1F => b' ',
            code @ 0x20..=0xFF => code as u8,
            _ => b'?',
        })
        .collect()
}

fn flatten_onto_white(image: &DynamicImage) -> RgbImage {
    let rgba = image.to_rgba8();
    let (w, h) = rgba.dimensions();
    let mut out = RgbImage::new(w, h);
    for (x, y, px) in rgba.enumerate_pixels() {
        let alpha = u16::from(px[3]);
        let blend = |c: u8| ((u16::from(c) * alpha + 255 * (255 - alpha)) / 255) as u8;
        out.put_pixel(x, y, Rgb([blend(px[0]), blend(px[1]), blend(px[2])]));
    }
    out
}
