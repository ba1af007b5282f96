//! Builds small EPUB files for unit tests.

use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

pub(crate) struct EpubFixture {
    title: String,
    creator: Option<String>,
    language: String,
    cover: Option<Cover>,
    documents: Vec<(String, String)>,
    spine: Vec<String>,
}

/// EPUB 3 `properties="cover-image"` or EPUB 2 `<meta name="cover">`.
enum Cover {
    Property(Vec<u8>),
    Meta(Vec<u8>),
}

impl Cover {
    fn file_name(&self) -> &'static str {
        match self {
            Self::Property(_) => "cover.jpg",
            Self::Meta(_) => "art.png",
        }
    }

    fn data(&self) -> &[u8] {
        match self {
            Self::Property(data) | Self::Meta(data) => data,
        }
    }
}

impl EpubFixture {
    pub(crate) fn new(title: &str) -> Self {
        Self {
            title: title.to_string(),
            creator: None,
            language: "en".to_string(),
            cover: None,
            documents: Vec::new(),
            spine: Vec::new(),
        }
    }

    pub(crate) fn creator(mut self, creator: &str) -> Self {
        self.creator = Some(creator.to_string());
        self
    }

    /// Adds a JPEG cover declared through manifest properties.
    pub(crate) fn cover(mut self, data: &[u8]) -> Self {
        self.cover = Some(Cover::Property(data.to_vec()));
        self
    }

    /// Adds a PNG cover declared through `<meta name="cover">`.
    pub(crate) fn cover_meta(mut self, data: &[u8]) -> Self {
        self.cover = Some(Cover::Meta(data.to_vec()));
        self
    }

    /// Adds a spine reference without touching the manifest.
    pub(crate) fn spine_ref(mut self, idref: &str) -> Self {
        self.spine.push(idref.to_string());
        self
    }

    /// Adds a spine document under `OEBPS/Text/` wrapping `body` in XHTML.
    pub(crate) fn document(mut self, name: &str, body: &str) -> Self {
        let html = format!(
            "<?xml version=\"1.0\" encoding=\"utf-8\"?>\n\
             <html xmlns=\"http://www.w3.org/1999/xhtml\"><head><title>{name}</title></head>\
             <body>{body}</body></html>"
        );
        self.spine.push(format!("doc{}", self.documents.len()));
        self.documents.push((name.to_string(), html));
        self
    }

    fn package(&self) -> String {
        let mut manifest = String::new();
        let mut spine = String::new();
        let mut cover_meta = String::new();

        for (i, (name, _)) in self.documents.iter().enumerate() {
            manifest.push_str(&format!(
                "<item id=\"doc{i}\" href=\"Text/{name}\" media-type=\"application/xhtml+xml\"/>\n"
            ));
        }
        for idref in &self.spine {
            spine.push_str(&format!("<itemref idref=\"{idref}\"/>\n"));
        }

        match self.cover {
            Some(Cover::Property(_)) => manifest.push_str(
                "<item id=\"cover-img\" href=\"Images/cover.jpg\" media-type=\"image/jpeg\" properties=\"cover-image\"/>\n",
            ),
            Some(Cover::Meta(_)) => {
                manifest.push_str(
                    "<item id=\"front-art\" href=\"Images/art.png\" media-type=\"image/png\"/>\n",
                );
                cover_meta.push_str("<meta name=\"cover\" content=\"front-art\"/>\n");
            }
            None => {}
        }

        let creator = self
            .creator
            .as_ref()
            .map(|c| format!("<dc:creator>{c}</dc:creator>"))
            .unwrap_or_default();

        format!(
            "<?xml version=\"1.0\" encoding=\"utf-8\"?>\n\
             <package xmlns=\"http://www.idpf.org/2007/opf\" version=\"3.0\" unique-identifier=\"uid\">\n\
             <metadata xmlns:dc=\"http://purl.org/dc/elements/1.1/\">\n\
             <dc:title>{title}</dc:title>{creator}<dc:language>{lang}</dc:language>\n\
             <dc:identifier id=\"uid\">urn:test:{title}</dc:identifier>\n\
             {cover_meta}</metadata>\n<manifest>\n{manifest}</manifest>\n<spine>\n{spine}</spine>\n</package>\n",
            title = self.title,
            lang = self.language,
        )
    }

    /// Writes `<dir>/fixture.epub` and returns its path.
    pub(crate) fn write(&self, dir: &Path) -> PathBuf {
        let path = dir.join("fixture.epub");
        let mut zip = ZipWriter::new(File::create(&path).unwrap());
        let stored = SimpleFileOptions::default().compression_method(CompressionMethod::Stored);
        let deflated = SimpleFileOptions::default();

        zip.start_file("mimetype", stored).unwrap();
        zip.write_all(b"application/epub+zip").unwrap();

        zip.start_file("META-INF/container.xml", deflated).unwrap();
        zip.write_all(
            b"<?xml version=\"1.0\"?>\n\
              <container version=\"1.0\" xmlns=\"urn:oasis:names:tc:opendocument:xmlns:container\">\
              <rootfiles><rootfile full-path=\"OEBPS/content.opf\" media-type=\"application/oebps-package+xml\"/></rootfiles>\
              </container>",
        )
        .unwrap();

        zip.start_file("OEBPS/content.opf", deflated).unwrap();
        zip.write_all(self.package().as_bytes()).unwrap();

        for (name, html) in &self.documents {
            zip.start_file(format!("OEBPS/Text/{name}"), deflated).unwrap();
            zip.write_all(html.as_bytes()).unwrap();
        }

        if let Some(ref cover) = self.cover {
            zip.start_file(format!("OEBPS/Images/{}", cover.file_name()), stored)
                .unwrap();
            zip.write_all(cover.data()).unwrap();
        }

        zip.finish().unwrap();
        path
    }
}
