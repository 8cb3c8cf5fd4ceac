//! 图片型 EPUB 3 打包：每页一张图片，一页一个 XHTML 文档。

use std::fs::{self, File};
use std::io::{self, Write as _};
use std::path::{Path, PathBuf};

use time::OffsetDateTime;
use time::macros::format_description;
use zip::CompressionMethod;
use zip::write::FileOptions;

use super::markup::escape_markup;
use crate::download::error::DownloadError;
use crate::download::models::{ChapterDescriptor, WorkMetadata};

const MIMETYPE: &str = "application/epub+zip";
const DEFAULT_LANGUAGE: &str = "zh";
const DEFAULT_IDENTIFIER: &str = "BookId";
/// 该标题的页面不生成 `<h1>`
const UNTITLED_PAGE: &str = "彩页";

/// OPF 中的元数据，所有文本在写入时转义。
#[derive(Debug, Clone, Default)]
pub(crate) struct EpubMetadata {
    pub title: String,
    pub creator: String,
    pub publisher: String,
    pub description: String,
    pub series: String,
    pub series_index: usize,
    pub subjects: Vec<String>,
    pub language: String,
    pub identifier: String,
}

impl EpubMetadata {
    pub fn new(work: &WorkMetadata, chapter: &ChapterDescriptor) -> Self {
        // 每章一本书：标题用章节名，作品名放在 calibre:series
        Self {
            title: chapter.name.clone(),
            creator: work.authors.clone(),
            publisher: String::new(),
            description: work.synopsis.clone(),
            series: work.title.clone(),
            series_index: chapter.index + 1,
            subjects: work.genre_list(),
            language: DEFAULT_LANGUAGE.to_string(),
            identifier: if chapter.uuid.is_empty() {
                DEFAULT_IDENTIFIER.to_string()
            } else {
                chapter.uuid.clone()
            },
        }
    }

    fn identifier(&self) -> &str {
        if self.identifier.is_empty() {
            DEFAULT_IDENTIFIER
        } else {
            &self.identifier
        }
    }
}

struct Page {
    /// 三位序号，从 001 开始
    number: String,
    /// `Images/` 下的文件名
    image: String,
    source: PathBuf,
}

fn number_fill(n: usize) -> String {
    format!("{n:03}")
}

fn media_type(file_name: &str) -> &'static str {
    let ext = file_name
        .rsplit_once('.')
        .map(|(_, e)| e.to_ascii_lowercase())
        .unwrap_or_default();
    match ext.as_str() {
        "jpg" | "jpeg" => "image/jpeg",
        "png" => "image/png",
        "gif" => "image/gif",
        "webp" => "image/webp",
        "avif" => "image/avif",
        _ => "application/octet-stream",
    }
}

fn modified_now() -> String {
    OffsetDateTime::now_utc()
        .format(format_description!(
            "[year]-[month]-[day]T[hour]:[minute]:[second]Z"
        ))
        .unwrap_or_else(|_| "1970-01-01T00:00:00Z".to_string())
}

fn container_xml() -> &'static str {
    r#"<?xml version="1.0" encoding="UTF-8"?>
<container version="1.0" xmlns="urn:oasis:names:tc:opendocument:xmlns:container">
  <rootfiles>
    <rootfile full-path="OEBPS/content.opf" media-type="application/oebps-package+xml" />
  </rootfiles>
</container>"#
}

fn opf_xml(meta: &EpubMetadata, pages: &[Page], modified: &str) -> String {
    let mut metadata = vec![format!("<dc:title>{}</dc:title>", escape_markup(&meta.title))];
    if !meta.creator.is_empty() {
        metadata.push(format!("<dc:creator>{}</dc:creator>", escape_markup(&meta.creator)));
    }
    if !meta.publisher.is_empty() {
        metadata.push(format!(
            "<dc:publisher>{}</dc:publisher>",
            escape_markup(&meta.publisher)
        ));
    }
    if !meta.description.is_empty() {
        metadata.push(format!(
            "<dc:description>{}</dc:description>",
            escape_markup(&meta.description)
        ));
    }
    let language = if meta.language.is_empty() {
        DEFAULT_LANGUAGE
    } else {
        &meta.language
    };
    metadata.push(format!("<dc:language>{}</dc:language>", escape_markup(language)));
    metadata.push(format!(
        "<dc:identifier id=\"BookId\">{}</dc:identifier>",
        escape_markup(meta.identifier())
    ));
    for subject in &meta.subjects {
        metadata.push(format!("<dc:subject>{}</dc:subject>", escape_markup(subject)));
    }
    metadata.push(format!("<meta property=\"dcterms:modified\">{modified}</meta>"));
    if !meta.series.is_empty() {
        metadata.push(format!(
            "<meta name=\"calibre:series\" content=\"{}\"/>",
            escape_markup(&meta.series)
        ));
    }
    metadata.push(format!(
        "<meta name=\"calibre:series_index\" content=\"{}\"/>",
        meta.series_index
    ));

    let mut manifest = vec![
        r#"<item id="ncx" href="toc.ncx" media-type="application/x-dtbncx+xml"/>"#.to_string(),
        r#"<item id="nav.xhtml" href="Text/nav.xhtml" media-type="application/xhtml+xml" properties="nav"/>"#
            .to_string(),
    ];
    let mut spine = Vec::with_capacity(pages.len());
    for page in pages {
        manifest.push(format!(
            "<item id=\"x{n}.xhtml\" href=\"Text/{n}.xhtml\" media-type=\"application/xhtml+xml\"/>",
            n = page.number
        ));
        manifest.push(format!(
            "<item id=\"img{n}\" href=\"Images/{img}\" media-type=\"{mt}\"/>",
            n = page.number,
            img = escape_markup(&page.image),
            mt = media_type(&page.image)
        ));
        spine.push(format!("<itemref idref=\"x{}.xhtml\"/>", page.number));
    }

    format!(
        r#"<?xml version="1.0" encoding="utf-8"?>
<package version="3.0" unique-identifier="BookId" xmlns="http://www.idpf.org/2007/opf">
  <metadata xmlns:dc="http://purl.org/dc/elements/1.1/" xmlns:opf="http://www.idpf.org/2007/opf">
    {}
  </metadata>
  <manifest>
    {}
  </manifest>
  <spine toc="ncx">
    {}
  </spine>
</package>"#,
        metadata.join("\n    "),
        manifest.join("\n    "),
        spine.join("\n    ")
    )
}

fn ncx_xml(meta: &EpubMetadata, pages: &[Page]) -> String {
    let nav_points: Vec<String> = pages
        .iter()
        .enumerate()
        .map(|(i, page)| {
            format!(
                r#"<navPoint id="navPoint-{order}" playOrder="{order}">
      <navLabel>
        <text>{n}</text>
      </navLabel>
      <content src="Text/{n}.xhtml" />
    </navPoint>"#,
                order = i + 1,
                n = page.number
            )
        })
        .collect();
    format!(
        r#"<?xml version="1.0" encoding="utf-8"?>
<!DOCTYPE ncx PUBLIC "-//NISO//DTD ncx 2005-1//EN"
 "http://www.daisy.org/z3986/2005/ncx-2005-1.dtd">
<ncx version="2005-1" xmlns="http://www.daisy.org/z3986/2005/ncx/">
  <head>
    <meta name="dtb:uid" content="{uid}" />
    <meta name="dtb:depth" content="1" />
    <meta name="dtb:totalPageCount" content="0" />
    <meta name="dtb:maxPageNumber" content="0" />
  </head>
  <docTitle>
    <text>{title}</text>
  </docTitle>
  <navMap>
    {points}
  </navMap>
</ncx>"#,
        uid = escape_markup(meta.identifier()),
        title = escape_markup(&meta.title),
        points = nav_points.join("\n    ")
    )
}

fn nav_xhtml(pages: &[Page]) -> String {
    let items: Vec<String> = pages
        .iter()
        .map(|p| format!("<li><a href=\"{n}.xhtml\">{n}</a></li>", n = p.number))
        .collect();
    format!(
        r#"<?xml version="1.0" encoding="utf-8"?>
<!DOCTYPE html>

<html xmlns="http://www.w3.org/1999/xhtml" xmlns:epub="http://www.idpf.org/2007/ops" lang="zh" xml:lang="zh">
<head>
  <title>目录</title>
  <meta charset="utf-8"/>
</head>
<body epub:type="frontmatter">
  <nav epub:type="toc" id="toc" role="doc-toc">
    <h1>目录</h1>
    <ol>
      {}
    </ol>
  </nav>
</body>
</html>"#,
        items.join("\n      ")
    )
}

/// 单页 XHTML。标题为空或为“彩页”时不输出 `<h1>`，空标题的 `<title>` 写作 `title`。
pub(crate) fn page_xhtml(title: &str, body: &str) -> String {
    let heading = if title.is_empty() || title == UNTITLED_PAGE {
        String::new()
    } else {
        format!("<h1>{}</h1>\n    ", escape_markup(title))
    };
    let head_title = if title.is_empty() {
        "title".to_string()
    } else {
        escape_markup(title)
    };
    format!(
        r#"<?xml version="1.0" encoding="utf-8"?>
<!DOCTYPE html>

<html xmlns="http://www.w3.org/1999/xhtml" xmlns:epub="http://www.idpf.org/2007/ops">
  <head>
    <title>{head_title}</title>
    <style type="text/css">img{{max-width:100%;}}</style>
  </head>
  <body>
    {heading}{body}
  </body>
</html>"#
    )
}

fn image_tag(image: &str) -> String {
    let src = escape_markup(image);
    format!("<img src=\"../Images/{src}\" alt=\"{src}\"/>")
}

/// 把 `images`（已按页序排列）写成 `dest`。`mimetype` 为第一个条目且不压缩。
pub(crate) fn write_epub(
    meta: &EpubMetadata,
    staging: &Path,
    images: &[PathBuf],
    dest: &Path,
) -> Result<(), DownloadError> {
    let pages: Vec<Page> = images
        .iter()
        .enumerate()
        .map(|(i, path)| {
            let rel = path.strip_prefix(staging).unwrap_or(path);
            Page {
                number: number_fill(i + 1),
                image: rel.to_string_lossy().replace('\\', "/"),
                source: path.clone(),
            }
        })
        .collect();

    write_zip(meta, &pages, dest).inspect_err(|_| {
        let _ = fs::remove_file(dest);
    })
}

fn write_zip(meta: &EpubMetadata, pages: &[Page], dest: &Path) -> Result<(), DownloadError> {
    let err = |e: &dyn std::fmt::Display| DownloadError::packaging(dest.display(), e);

    let out = File::create(dest).map_err(|e| err(&e))?;
    let mut zip = zip::ZipWriter::new(out);
    let stored = FileOptions::default().compression_method(CompressionMethod::Stored);
    let deflated = FileOptions::default().compression_method(CompressionMethod::Deflated);

    zip.start_file("mimetype", stored).map_err(|e| err(&e))?;
    zip.write_all(MIMETYPE.as_bytes()).map_err(|e| err(&e))?;

    for page in pages {
        zip.start_file(format!("OEBPS/Images/{}", page.image), deflated)
            .map_err(|e| err(&e))?;
        let mut reader = File::open(&page.source)
            .map_err(|e| DownloadError::packaging(page.source.display(), e))?;
        io::copy(&mut reader, &mut zip).map_err(|e| err(&e))?;
    }

    let modified = modified_now();
    let mut documents = vec![
        ("META-INF/container.xml".to_string(), container_xml().to_string()),
        ("OEBPS/content.opf".to_string(), opf_xml(meta, pages, &modified)),
        ("OEBPS/toc.ncx".to_string(), ncx_xml(meta, pages)),
        ("OEBPS/Text/nav.xhtml".to_string(), nav_xhtml(pages)),
    ];
    for page in pages {
        documents.push((
            format!("OEBPS/Text/{}.xhtml", page.number),
            page_xhtml("", &image_tag(&page.image)),
        ));
    }
    for (name, content) in documents {
        zip.start_file(name, deflated).map_err(|e| err(&e))?;
        zip.write_all(content.as_bytes()).map_err(|e| err(&e))?;
    }

    zip.finish().map_err(|e| err(&e))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Read as _;

    fn sample_meta() -> EpubMetadata {
        EpubMetadata {
            title: "胆大党".to_string(),
            creator: "龙幸伸".to_string(),
            description: "A & B".to_string(),
            series: "胆大党".to_string(),
            series_index: 3,
            subjects: vec!["冒险".to_string()],
            ..EpubMetadata::default()
        }
    }

    fn read_entry(zip: &mut zip::ZipArchive<File>, name: &str) -> String {
        let mut out = String::new();
        zip.by_name(name).unwrap().read_to_string(&mut out).unwrap();
        out
    }

    #[test]
    fn mimetype_is_first_and_stored() {
        let dir = tempfile::tempdir().unwrap();
        let staging = dir.path().join("ch");
        fs::create_dir_all(&staging).unwrap();
        let images: Vec<_> = ["001.jpg", "002.png"]
            .iter()
            .map(|n| {
                let p = staging.join(n);
                fs::write(&p, b"img").unwrap();
                p
            })
            .collect();
        let dest = dir.path().join("ch.epub");

        write_epub(&sample_meta(), &staging, &images, &dest).unwrap();

        let mut zip = zip::ZipArchive::new(File::open(&dest).unwrap()).unwrap();
        {
            let first = zip.by_index(0).unwrap();
            assert_eq!(first.name(), "mimetype");
            assert_eq!(first.compression(), CompressionMethod::Stored);
        }
        assert_eq!(read_entry(&mut zip, "mimetype"), MIMETYPE);
        assert!(zip.by_name("OEBPS/Images/002.png").is_ok());
        assert!(zip.by_name("META-INF/container.xml").is_ok());

        let opf = read_entry(&mut zip, "OEBPS/content.opf");
        assert!(opf.contains("<dc:description>A &amp; B</dc:description>"));
        assert!(opf.contains("<dc:language>zh</dc:language>"));
        assert!(opf.contains(r#"<dc:identifier id="BookId">BookId</dc:identifier>"#));
        assert!(opf.contains(r#"content="3"/>"#));
        assert!(opf.contains(r#"href="Images/002.png" media-type="image/png""#));

        let page = read_entry(&mut zip, "OEBPS/Text/002.xhtml");
        assert!(page.contains(r#"<img src="../Images/002.png" alt="002.png"/>"#));
        assert!(!page.contains("<h1>"));
    }

    #[test]
    fn nav_lists_pages_in_increasing_order() {
        let dir = tempfile::tempdir().unwrap();
        let staging = dir.path().join("ch");
        fs::create_dir_all(&staging).unwrap();
        let images: Vec<_> = (1..=12)
            .map(|i| {
                let p = staging.join(format!("{i:03}.jpg"));
                fs::write(&p, b"img").unwrap();
                p
            })
            .collect();
        let dest = dir.path().join("ch.epub");
        write_epub(&sample_meta(), &staging, &images, &dest).unwrap();

        let mut zip = zip::ZipArchive::new(File::open(&dest).unwrap()).unwrap();
        let nav = read_entry(&mut zip, "OEBPS/Text/nav.xhtml");
        let hrefs: Vec<usize> = nav
            .match_indices("<a href=\"")
            .map(|(at, m)| nav[at + m.len()..at + m.len() + 3].parse().unwrap())
            .collect();
        assert_eq!(hrefs, (1..=12).collect::<Vec<_>>());

        let ncx = read_entry(&mut zip, "OEBPS/toc.ncx");
        assert!(ncx.contains(r#"playOrder="12""#));
    }

    #[test]
    fn chapters_of_one_work_are_distinct_books() {
        let work = WorkMetadata {
            path_word: "dandadan".to_string(),
            title: "胆大党".to_string(),
            ..WorkMetadata::default()
        };
        let chapter = |index: usize| ChapterDescriptor {
            index,
            uuid: format!("uuid-{index}"),
            name: format!("第{}话", index + 1),
            ..ChapterDescriptor::default()
        };
        let first = EpubMetadata::new(&work, &chapter(0));
        let second = EpubMetadata::new(&work, &chapter(1));

        assert_eq!(first.title, "第1话");
        assert_eq!(second.title, "第2话");
        assert_eq!(first.series, "胆大党");
        assert_eq!(second.series_index, 2);
        assert_ne!(first.identifier(), second.identifier());

        let untracked = EpubMetadata::new(&work, &ChapterDescriptor::default());
        assert_eq!(untracked.identifier(), DEFAULT_IDENTIFIER);
    }

    #[test]
    fn page_heading_rules() {
        assert!(page_xhtml("第1话", "").contains("<h1>第1话</h1>"));
        assert!(!page_xhtml("彩页", "").contains("<h1>"));
        let untitled = page_xhtml("", "");
        assert!(untitled.contains("<title>title</title>"));
        assert!(!untitled.contains("<h1>"));
    }
}
