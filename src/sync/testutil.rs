use std::fs;
use std::io::Write;
use std::path::Path;
use zip::write::SimpleFileOptions;

/// Write a minimal but structurally valid Standard Ebooks style EPUB.
pub fn write_epub(path: &Path, identifier: &str, title: &str, modified: &str) {
    let bytes = epub_bytes(identifier, title, modified);
    fs::write(path, bytes).expect("write epub");
}

/// Build the bytes of a minimal EPUB container in memory.
pub fn epub_bytes(identifier: &str, title: &str, modified: &str) -> Vec<u8> {
    let container = r#"<?xml version="1.0" encoding="UTF-8"?>
<container version="1.0" xmlns="urn:oasis:names:tc:opendocument:xmlns:container">
  <rootfiles>
    <rootfile full-path="epub/content.opf" media-type="application/oebps-package+xml"/>
  </rootfiles>
</container>"#;
    let opf = format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<package xmlns="http://www.idpf.org/2007/opf" xmlns:dc="http://purl.org/dc/elements/1.1/" version="3.0">
  <metadata>
    <dc:identifier id="uid">{identifier}</dc:identifier>
    <dc:title>{title}</dc:title>
    <meta property="dcterms:modified">{modified}</meta>
  </metadata>
</package>"#
    );

    let mut cursor = std::io::Cursor::new(Vec::new());
    {
        let mut writer = zip::ZipWriter::new(&mut cursor);
        let options = SimpleFileOptions::default();
        writer
            .start_file("META-INF/container.xml", options)
            .expect("start container.xml");
        writer.write_all(container.as_bytes()).expect("container.xml");
        writer
            .start_file("epub/content.opf", options)
            .expect("start content.opf");
        writer.write_all(opf.as_bytes()).expect("content.opf");
        writer.finish().expect("finish zip");
    }
    cursor.into_inner()
}
