//! PDF document composer

use super::{DocumentComposer, write_via_temp};
use crate::error::{Error, Result};
use image::codecs::jpeg::JpegDecoder;
use image::{ColorType, ImageDecoder, ImageFormat};
use lopdf::{Document, Object, ObjectId, Stream, dictionary};
use std::io::{BufWriter, Cursor, Write};
use std::path::{Path, PathBuf};

/// Builds a PDF with one page per image, each page sized to its image
///
/// Baseline RGB and grayscale JPEGs are embedded as-is (DCTDecode); any other
/// image is decoded and stored as raw RGB. An image that cannot be decoded is
/// left out with a warning; composing fails only when none can be.
#[derive(Debug, Clone, Copy, Default)]
pub struct PdfComposer;

struct PageImage {
    width: u32,
    height: u32,
    color_space: &'static str,
    filter: Option<&'static str>,
    data: Vec<u8>,
}

impl PageImage {
    fn load(path: &Path) -> Result<Self> {
        let bytes = std::fs::read(path)?;

        if image::guess_format(&bytes).ok() == Some(ImageFormat::Jpeg) {
            if let Some(page) = Self::passthrough_jpeg(&bytes) {
                return Ok(Self { data: bytes, ..page });
            }
        }

        let img = image::load_from_memory(&bytes).map_err(|e| {
            Error::Artifact(format!("failed to load image {}: {}", path.display(), e))
        })?;
        let rgb = img.to_rgb8();
        Ok(Self {
            width: rgb.width(),
            height: rgb.height(),
            color_space: "DeviceRGB",
            filter: None,
            data: rgb.into_raw(),
        })
    }

    /// Header-only inspection of a JPEG that PDF readers can decode directly
    fn passthrough_jpeg(bytes: &[u8]) -> Option<Self> {
        let decoder = JpegDecoder::new(Cursor::new(bytes)).ok()?;
        let (width, height) = decoder.dimensions();
        let color_space = match decoder.color_type() {
            ColorType::Rgb8 => "DeviceRGB",
            ColorType::L8 => "DeviceGray",
            _ => return None,
        };
        Some(Self {
            width,
            height,
            color_space,
            filter: Some("DCTDecode"),
            data: Vec::new(),
        })
    }
}

fn add_page(doc: &mut Document, pages_id: ObjectId, image: PageImage) -> ObjectId {
    let mut image_dict = dictionary! {
        "Type" => "XObject",
        "Subtype" => "Image",
        "Width" => image.width as i64,
        "Height" => image.height as i64,
        "ColorSpace" => image.color_space,
        "BitsPerComponent" => 8,
    };
    if let Some(filter) = image.filter {
        image_dict.set("Filter", filter);
    }
    let image_id = doc.add_object(Object::Stream(Stream::new(image_dict, image.data)));

    let resources_id = doc.add_object(dictionary! {
        "XObject" => dictionary! {
            "Im1" => image_id,
        },
    });

    let (width, height) = (image.width as i64, image.height as i64);
    let content = format!("q\n{width} 0 0 {height} 0 0 cm\n/Im1 Do\nQ\n");
    let content_id = doc.add_object(Object::Stream(Stream::new(dictionary! {}, content.into_bytes())));

    doc.add_object(dictionary! {
        "Type" => "Page",
        "Parent" => pages_id,
        "MediaBox" => vec![0.into(), 0.into(), width.into(), height.into()],
        "Resources" => resources_id,
        "Contents" => content_id,
    })
}

/// Build the PDF bytes for an ordered list of images
fn render(images: &[PathBuf]) -> Result<Vec<u8>> {
    if images.is_empty() {
        return Err(Error::Artifact("no images to compose".into()));
    }

    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();

    let mut kids = Vec::with_capacity(images.len());
    for path in images {
        match PageImage::load(path) {
            Ok(page) => kids.push(Object::from(add_page(&mut doc, pages_id, page))),
            Err(e) => tracing::warn!(
                path = %path.display(),
                error = %e,
                "Leaving undecodable image out of document"
            ),
        }
    }
    if kids.is_empty() {
        return Err(Error::Artifact(format!(
            "none of the {} images could be decoded",
            images.len()
        )));
    }

    let count = kids.len() as i64;
    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => kids,
            "Count" => count,
        }),
    );

    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);

    let mut buffer = Vec::new();
    doc.save_to(&mut buffer)
        .map_err(|e| Error::Artifact(format!("failed to write PDF: {e}")))?;
    Ok(buffer)
}

impl DocumentComposer for PdfComposer {
    fn compose(&self, images: &[PathBuf], dest: &Path) -> Result<()> {
        let bytes = render(images)?;
        write_via_temp(dest, |file| {
            let mut writer = BufWriter::new(file);
            writer.write_all(&bytes)?;
            writer.flush()?;
            Ok(())
        })
    }
}
