//! Single-page PDF export of a media record.
//!
//! The poster is downloaded, re-encoded as baseline JPEG and embedded as a
//! `DCTDecode` image XObject. Text uses the standard Helvetica fonts, so the
//! document needs no embedded font files.

use crate::models::Media;
use anyhow::{bail, Context, Result};
use base64::{engine::general_purpose::STANDARD, Engine};
use image::codecs::jpeg::JpegEncoder;
use image::ColorType;
use lopdf::content::{Content, Operation};
use lopdf::{dictionary, Document, Object, Stream};
use std::time::Duration;
use tracing::{debug, instrument};

// A4 in points
const PAGE_WIDTH: i64 = 595;
const PAGE_HEIGHT: i64 = 842;
const MARGIN: i64 = 40;
const POSTER_BOX: u32 = 500;
const JPEG_QUALITY: u8 = 85;

/// Loads poster images for embedding, from HTTP(S) or inline `data:` URIs
#[derive(Clone)]
pub struct PosterFetcher {
    client: reqwest::Client,
    max_bytes: usize,
}

impl PosterFetcher {
    pub fn new(timeout: Duration, max_bytes: usize) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to build poster HTTP client")?;

        Ok(Self { client, max_bytes })
    }

    /// Resolve a `Poster` value to raw image bytes
    pub async fn load(&self, source: &str) -> Result<Vec<u8>> {
        if source.get(..5).is_some_and(|scheme| scheme.eq_ignore_ascii_case("data:")) {
            self.decode_data_uri(source)
        } else {
            self.fetch(source).await
        }
    }

    #[instrument(skip(self))]
    pub async fn fetch(&self, url: &str) -> Result<Vec<u8>> {
        let mut response = self
            .client
            .get(url)
            .send()
            .await
            .context("Failed to request poster")?
            .error_for_status()
            .context("Poster request rejected")?;

        if let Some(length) = response.content_length() {
            if length > self.max_bytes as u64 {
                bail!("Poster is {length} bytes, limit is {}", self.max_bytes);
            }
        }

        let mut body = Vec::new();
        while let Some(chunk) = response.chunk().await.context("Failed to read poster body")? {
            if body.len() + chunk.len() > self.max_bytes {
                bail!("Poster exceeds {} bytes", self.max_bytes);
            }
            body.extend_from_slice(&chunk);
        }

        debug!(size_bytes = body.len(), "Poster downloaded");

        Ok(body)
    }

    /// `data:[<mime>][;base64],<payload>`; only base64 payloads carry images
    fn decode_data_uri(&self, uri: &str) -> Result<Vec<u8>> {
        let (meta, payload) = uri[5..]
            .split_once(',')
            .context("Malformed data URI: missing ','")?;

        if !meta.to_ascii_lowercase().ends_with(";base64") {
            bail!("Only base64 data URIs are supported for posters");
        }

        let payload = payload.trim();
        if payload.len() / 4 * 3 > self.max_bytes {
            bail!("Poster exceeds {} bytes", self.max_bytes);
        }

        let bytes = STANDARD
            .decode(payload)
            .context("Invalid base64 in poster data URI")?;

        debug!(size_bytes = bytes.len(), "Poster decoded from data URI");

        Ok(bytes)
    }
}

/// A poster ready to be placed on a page
#[derive(Debug, Clone)]
pub struct PosterImage {
    pub width: u32,
    pub height: u32,
    jpeg: Vec<u8>,
}

impl PosterImage {
    /// Decode any supported image format into an embeddable JPEG
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        let rgb = image::load_from_memory(bytes)
            .context("Failed to decode poster image")?
            .to_rgb8();
        let (width, height) = rgb.dimensions();

        if width == 0 || height == 0 {
            bail!("Poster image has no pixels");
        }

        let mut jpeg = Vec::new();
        JpegEncoder::new_with_quality(&mut jpeg, JPEG_QUALITY)
            .encode(rgb.as_raw(), width, height, ColorType::Rgb8)
            .context("Failed to encode poster as JPEG")?;

        Ok(Self {
            width,
            height,
            jpeg,
        })
    }

    /// Size on the page, scaled to fit the poster box
    fn fitted_size(&self) -> (i64, i64) {
        let scale = f64::from(POSTER_BOX) / f64::from(self.width.max(self.height));
        let width = (f64::from(self.width) * scale).round().max(1.0) as i64;
        let height = (f64::from(self.height) * scale).round().max(1.0) as i64;
        (width, height)
    }
}

/// Render the export sheet for `media`
pub fn render_media_sheet(media: &Media, poster: Option<&PosterImage>) -> Result<Vec<u8>> {
    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();

    let regular_id = doc.add_object(standard_font("Helvetica"));
    let bold_id = doc.add_object(standard_font("Helvetica-Bold"));

    let mut operations = Vec::new();
    let mut cursor = PAGE_HEIGHT - MARGIN - 20;

    text_line(&mut operations, "F2", 20, MARGIN, cursor, "Movie Search Results");
    cursor -= 40;
    text_line(&mut operations, "F1", 20, MARGIN, cursor, &media.title);
    cursor -= 20;

    let mut xobjects = lopdf::Dictionary::new();
    if let Some(poster) = poster {
        let (width, height) = poster.fitted_size();
        cursor -= height;

        let image_id = doc.add_object(Stream::new(
            dictionary! {
                "Type" => "XObject",
                "Subtype" => "Image",
                "Width" => Object::Integer(i64::from(poster.width)),
                "Height" => Object::Integer(i64::from(poster.height)),
                "ColorSpace" => "DeviceRGB",
                "BitsPerComponent" => Object::Integer(8),
                "Filter" => "DCTDecode",
            },
            poster.jpeg.clone(),
        ));
        xobjects.set("Im1", image_id);

        let x = (PAGE_WIDTH - width) / 2;
        operations.push(Operation::new("q", vec![]));
        operations.push(Operation::new(
            "cm",
            vec![
                Object::Integer(width),
                Object::Integer(0),
                Object::Integer(0),
                Object::Integer(height),
                Object::Integer(x),
                Object::Integer(cursor),
            ],
        ));
        operations.push(Operation::new("Do", vec![Object::Name(b"Im1".to_vec())]));
        operations.push(Operation::new("Q", vec![]));
        cursor -= 20;
    }

    for line in [
        format!("Title: {}", media.title),
        format!("Type: {}", media.media_type),
        format!("Year: {}", media.year),
    ] {
        cursor -= 30;
        text_line(&mut operations, "F2", 20, MARGIN, cursor, &line);
    }

    let content = Content { operations }
        .encode()
        .context("Failed to encode page content")?;
    let content_id = doc.add_object(Stream::new(dictionary! {}, content));

    let resources_id = doc.add_object(dictionary! {
        "Font" => dictionary! {
            "F1" => regular_id,
            "F2" => bold_id,
        },
        "XObject" => xobjects,
    });

    let page_id = doc.add_object(dictionary! {
        "Type" => "Page",
        "Parent" => pages_id,
        "Contents" => content_id,
        "Resources" => resources_id,
    });

    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => vec![Object::Reference(page_id)],
            "Count" => Object::Integer(1),
            "MediaBox" => vec![
                Object::Integer(0),
                Object::Integer(0),
                Object::Integer(PAGE_WIDTH),
                Object::Integer(PAGE_HEIGHT),
            ],
        }),
    );

    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);

    let mut rendered = Vec::new();
    doc.save_to(&mut rendered)
        .context("Failed to serialize PDF document")?;

    Ok(rendered)
}

fn standard_font(base_font: &str) -> lopdf::Dictionary {
    dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => base_font,
        "Encoding" => "WinAnsiEncoding",
    }
}

fn text_line(operations: &mut Vec<Operation>, font: &str, size: i64, x: i64, y: i64, text: &str) {
    operations.push(Operation::new("BT", vec![]));
    operations.push(Operation::new(
        "Tf",
        vec![Object::Name(font.as_bytes().to_vec()), Object::Integer(size)],
    ));
    operations.push(Operation::new("Td", vec![Object::Integer(x), Object::Integer(y)]));
    operations.push(Operation::new("Tj", vec![Object::string_literal(win_ansi(text))]));
    operations.push(Operation::new("ET", vec![]));
}

/// WinAnsi code points 0x80..=0x9F that differ from Latin-1
const WIN_ANSI_HIGH: [(char, u8); 27] = [
    ('\u{20AC}', 0x80),
    ('\u{201A}', 0x82),
    ('\u{0192}', 0x83),
    ('\u{201E}', 0x84),
    ('\u{2026}', 0x85),
    ('\u{2020}', 0x86),
    ('\u{2021}', 0x87),
    ('\u{02C6}', 0x88),
    ('\u{2030}', 0x89),
    ('\u{0160}', 0x8A),
    ('\u{2039}', 0x8B),
    ('\u{0152}', 0x8C),
    ('\u{017D}', 0x8E),
    ('\u{2018}', 0x91),
    ('\u{2019}', 0x92),
    ('\u{201C}', 0x93),
    ('\u{201D}', 0x94),
    ('\u{2022}', 0x95),
    ('\u{2013}', 0x96),
    ('\u{2014}', 0x97),
    ('\u{02DC}', 0x98),
    ('\u{2122}', 0x99),
    ('\u{0161}', 0x9A),
    ('\u{203A}', 0x9B),
    ('\u{0153}', 0x9C),
    ('\u{017E}', 0x9E),
    ('\u{0178}', 0x9F),
];

/// Encode for the standard fonts; unrepresentable characters become '?'
fn win_ansi(text: &str) -> Vec<u8> {
    text.chars()
        .map(|c| match u32::from(c) {
            code @ (0x00..=0x7F | 0xA0..=0xFF) => code as u8,
            _ => WIN_ANSI_HIGH
                .iter()
                .find(|(ch, _)| *ch == c)
                .map_or(b'?', |&(_, byte)| byte),
        })
        .collect()
}
