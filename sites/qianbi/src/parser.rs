//! HTML parsing for www.23qb.com pages.

use std::collections::HashMap;

use once_cell::sync::Lazy;
use regex::Regex;
use scraper::{Html, Selector};

use folio_engine::Parser;
use folio_types::{BookInfo, ChapterEntry, ChapterRecord, Volume};

static META_SEL: Lazy<Selector> =
    Lazy::new(|| Selector::parse("meta[property]").expect("valid selector"));
static CATALOG_LINK_SEL: Lazy<Selector> =
    Lazy::new(|| Selector::parse("#chapter-list li a").expect("valid selector"));
static CHAPTER_TITLE_SEL: Lazy<Selector> =
    Lazy::new(|| Selector::parse("h1").expect("valid selector"));
static CONTENT_SEL: Lazy<Selector> =
    Lazy::new(|| Selector::parse("#TextContent p").expect("valid selector"));
static PAGER_LINK_SEL: Lazy<Selector> =
    Lazy::new(|| Selector::parse(".page1 a").expect("valid selector"));

static CID_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"/book/\d+/(\d+)\.html").expect("valid regex"));

#[derive(Default)]
pub struct QianbiParser;

impl QianbiParser {
    pub fn new() -> Self {
        Self
    }

    /// Collect `og:*` metadata of the info page into a property map.
    fn og_properties(doc: &Html) -> HashMap<String, String> {
        doc.select(&META_SEL)
            .filter_map(|el| {
                let property = el.value().attr("property")?;
                let content = el.value().attr("content")?;
                Some((property.to_string(), content.to_string()))
            })
            .collect()
    }

    fn catalog_chapters(catalog_html: &str) -> Vec<ChapterEntry> {
        let doc = Html::parse_document(catalog_html);
        doc.select(&CATALOG_LINK_SEL)
            .map(|link| {
                let href = link.value().attr("href").unwrap_or_default();
                ChapterEntry {
                    chapter_id: extract_cid(href),
                    title: link.text().collect::<String>().trim().to_string(),
                    url: Some(href.to_string()),
                }
            })
            .collect()
    }
}

fn extract_cid(href: &str) -> Option<String> {
    CID_RE
        .captures(href)
        .map(|caps| caps[1].to_string())
        .filter(|cid| !cid.is_empty())
}

impl Parser for QianbiParser {
    fn parse_book_info(&self, html_list: &[String]) -> Option<BookInfo> {
        let info_html = html_list.first()?;
        let og = Self::og_properties(&Html::parse_document(info_html));

        let book_name = og.get("og:novel:book_name").cloned()?;
        if book_name.is_empty() {
            return None;
        }

        let chapters = html_list
            .get(1)
            .map(|catalog| Self::catalog_chapters(catalog))
            .unwrap_or_default();

        Some(BookInfo {
            book_name,
            author: og.get("og:novel:author").cloned().unwrap_or_default(),
            cover_url: og.get("og:image").cloned().unwrap_or_default(),
            update_time: og.get("og:novel:update_time").cloned().unwrap_or_default(),
            serial_status: og.get("og:novel:status").cloned().unwrap_or_default(),
            word_count: String::new(),
            summary: og.get("og:description").cloned().unwrap_or_default(),
            tags: og
                .get("og:novel:category")
                .filter(|c| !c.is_empty())
                .map(|c| vec![c.clone()])
                .unwrap_or_default(),
            volumes: vec![Volume {
                volume_name: "正文".to_string(),
                chapters,
                ..Default::default()
            }],
        })
    }

    fn parse_chapter(&self, html_list: &[String], chapter_id: &str) -> Option<ChapterRecord> {
        let mut title = String::new();
        let mut paragraphs: Vec<String> = Vec::new();
        let mut next_cid: Option<String> = None;

        for html in html_list {
            let doc = Html::parse_document(html);

            if title.is_empty() {
                if let Some(heading) = doc.select(&CHAPTER_TITLE_SEL).next() {
                    title = heading.text().collect::<String>().trim().to_string();
                }
            }

            paragraphs.extend(doc.select(&CONTENT_SEL).filter_map(|p| {
                let text = p.text().collect::<String>().trim().to_string();
                (!text.is_empty()).then_some(text)
            }));

            // The pager of the last sub-page carries the successor link.
            for link in doc.select(&PAGER_LINK_SEL) {
                let text = link.text().collect::<String>();
                if text.contains("下一章") {
                    next_cid = link.value().attr("href").and_then(extract_cid);
                }
            }
        }

        if paragraphs.is_empty() {
            return None;
        }

        let content = paragraphs.join("\n");
        let word_count = content.chars().count();
        let mut record = ChapterRecord::new(chapter_id, title, content)
            .with_extra("word_count", word_count);
        if let Some(next_cid) = next_cid {
            record = record.with_extra("next_chapter_id", next_cid);
        }
        Some(record)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const INFO_PAGE: &str = r#"<html><head>
        <meta property="og:novel:book_name" content="测试小说" />
        <meta property="og:novel:author" content="某作者" />
        <meta property="og:novel:status" content="连载中" />
        <meta property="og:novel:update_time" content="2024-05-01 10:20:30" />
        <meta property="og:novel:category" content="科幻" />
        <meta property="og:image" content="https://www.23qb.com/cover/1.jpg" />
        <meta property="og:description" content="简介文字" />
    </head><body></body></html>"#;

    const CATALOG_PAGE: &str = r#"<html><body>
        <ul id="chapter-list">
            <li><a href="/book/123/1001.html">第一章 起点</a></li>
            <li><a href="/book/123/1002.html">第二章 续章</a></li>
            <li><a href="javascript:void(0)">第三章 锁定</a></li>
        </ul>
    </body></html>"#;

    const CHAPTER_PAGE: &str = r#"<html><body>
        <h1>第一章 起点</h1>
        <div id="TextContent">
            <p>第一段。</p>
            <p>  </p>
            <p>第二段。</p>
        </div>
        <div class="page1">
            <a href="/book/123/catalog">目录</a>
            <a href="/book/123/1002.html">下一章</a>
        </div>
    </body></html>"#;

    #[test]
    fn parses_book_info_from_meta_and_catalog() {
        let parser = QianbiParser::new();
        let info = parser
            .parse_book_info(&[INFO_PAGE.to_string(), CATALOG_PAGE.to_string()])
            .unwrap();

        assert_eq!(info.book_name, "测试小说");
        assert_eq!(info.author, "某作者");
        assert_eq!(info.serial_status, "连载中");
        assert_eq!(info.update_time, "2024-05-01 10:20:30");
        assert_eq!(info.tags, vec!["科幻".to_string()]);

        let chapters = &info.volumes[0].chapters;
        assert_eq!(chapters.len(), 3);
        assert_eq!(chapters[0].chapter_id.as_deref(), Some("1001"));
        assert_eq!(chapters[0].title, "第一章 起点");
        // Locked chapters keep their slot but carry no id.
        assert_eq!(chapters[2].chapter_id, None);
    }

    #[test]
    fn missing_book_name_is_not_found() {
        let parser = QianbiParser::new();
        assert!(parser
            .parse_book_info(&["<html></html>".to_string()])
            .is_none());
        assert!(parser.parse_book_info(&[]).is_none());
    }

    #[test]
    fn parses_chapter_with_successor_link() {
        let parser = QianbiParser::new();
        let record = parser
            .parse_chapter(&[CHAPTER_PAGE.to_string()], "1001")
            .unwrap();

        assert_eq!(record.id, "1001");
        assert_eq!(record.title, "第一章 起点");
        assert_eq!(record.content, "第一段。\n第二段。");
        assert_eq!(record.next_chapter_id(), Some("1002"));
    }

    #[test]
    fn empty_page_yields_none() {
        let parser = QianbiParser::new();
        assert!(parser
            .parse_chapter(&["<html><body></body></html>".to_string()], "1001")
            .is_none());
    }

    #[test]
    fn sub_pages_are_concatenated() {
        let page2 = r#"<html><body><h1>第一章 起点</h1>
            <div id="TextContent"><p>第三段。</p></div></body></html>"#;
        let parser = QianbiParser::new();
        let record = parser
            .parse_chapter(&[CHAPTER_PAGE.to_string(), page2.to_string()], "1001")
            .unwrap();
        assert_eq!(record.content, "第一段。\n第二段。\n第三段。");
    }
}
