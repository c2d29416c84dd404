//! HTML parsing for www.esjzone.cc pages.

use once_cell::sync::Lazy;
use regex::Regex;
use scraper::{Html, Selector};

use folio_engine::Parser;
use folio_types::{BookInfo, ChapterEntry, ChapterRecord, Volume};

static TITLE_SEL: Lazy<Selector> =
    Lazy::new(|| Selector::parse("h2.p-t-10.text-normal").expect("valid selector"));
static DETAIL_LI_SEL: Lazy<Selector> =
    Lazy::new(|| Selector::parse("ul.book-detail li").expect("valid selector"));
static AUTHOR_LINK_SEL: Lazy<Selector> = Lazy::new(|| Selector::parse("a").expect("valid selector"));
static COVER_SEL: Lazy<Selector> =
    Lazy::new(|| Selector::parse("div.product-gallery img").expect("valid selector"));
static SUMMARY_SEL: Lazy<Selector> =
    Lazy::new(|| Selector::parse("div.description p").expect("valid selector"));
static CHAPTER_LINK_SEL: Lazy<Selector> =
    Lazy::new(|| Selector::parse("#chapterList a[href]").expect("valid selector"));
static CHAPTER_HEADING_SEL: Lazy<Selector> =
    Lazy::new(|| Selector::parse("h2").expect("valid selector"));
static FORUM_CONTENT_SEL: Lazy<Selector> =
    Lazy::new(|| Selector::parse("div.forum-content p").expect("valid selector"));

static CID_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"/forum/\d+/(\d+)\.html").expect("valid regex"));
static DATE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(\d{4}-\d{2}-\d{2})").expect("valid regex"));

#[derive(Default)]
pub struct EsjzoneParser;

impl EsjzoneParser {
    pub fn new() -> Self {
        Self
    }
}

fn element_text(el: scraper::ElementRef<'_>) -> String {
    el.text().collect::<String>().trim().to_string()
}

fn extract_cid(href: &str) -> Option<String> {
    CID_RE.captures(href).map(|caps| caps[1].to_string())
}

impl Parser for EsjzoneParser {
    fn parse_book_info(&self, html_list: &[String]) -> Option<BookInfo> {
        let doc = Html::parse_document(html_list.first()?);

        let book_name = doc.select(&TITLE_SEL).next().map(element_text)?;
        if book_name.is_empty() {
            return None;
        }

        let mut author = String::new();
        let mut update_time = String::new();
        let mut serial_status = String::new();
        let mut word_count = String::new();
        for li in doc.select(&DETAIL_LI_SEL) {
            let text = element_text(li);
            if text.starts_with("作者") {
                author = li
                    .select(&AUTHOR_LINK_SEL)
                    .next()
                    .map(element_text)
                    .unwrap_or_else(|| text.trim_start_matches("作者:").trim().to_string());
            } else if text.starts_with("更新日期") {
                // The site only exposes a date; midnight keeps the
                // staleness math on the safe side.
                if let Some(caps) = DATE_RE.captures(&text) {
                    update_time = format!("{} 00:00:00", &caps[1]);
                }
            } else if text.starts_with("連載狀態") || text.starts_with("连载状态") {
                serial_status = text
                    .split_once(':')
                    .map(|(_, v)| v.trim().to_string())
                    .unwrap_or_default();
            } else if text.starts_with("總字數") || text.starts_with("总字数") {
                word_count = text
                    .split_once(':')
                    .map(|(_, v)| v.trim().to_string())
                    .unwrap_or_default();
            }
        }

        let cover_url = doc
            .select(&COVER_SEL)
            .next()
            .and_then(|img| img.value().attr("src"))
            .unwrap_or_default()
            .to_string();

        let summary = doc
            .select(&SUMMARY_SEL)
            .map(element_text)
            .filter(|p| !p.is_empty())
            .collect::<Vec<_>>()
            .join("\n");

        let chapters: Vec<ChapterEntry> = doc
            .select(&CHAPTER_LINK_SEL)
            .map(|link| {
                let href = link.value().attr("href").unwrap_or_default();
                ChapterEntry {
                    // External chapters (hosted off-site) keep their slot
                    // but carry no id.
                    chapter_id: extract_cid(href),
                    title: element_text(link),
                    url: Some(href.to_string()),
                }
            })
            .collect();

        Some(BookInfo {
            book_name,
            author,
            cover_url,
            update_time,
            serial_status,
            word_count,
            summary,
            tags: Vec::new(),
            volumes: vec![Volume {
                volume_name: "正文".to_string(),
                chapters,
                ..Default::default()
            }],
        })
    }

    fn parse_chapter(&self, html_list: &[String], chapter_id: &str) -> Option<ChapterRecord> {
        let doc = Html::parse_document(html_list.first()?);

        let title = doc
            .select(&CHAPTER_HEADING_SEL)
            .next()
            .map(element_text)
            .unwrap_or_default();

        let paragraphs: Vec<String> = doc
            .select(&FORUM_CONTENT_SEL)
            .map(element_text)
            .filter(|p| !p.is_empty())
            .collect();
        if paragraphs.is_empty() {
            return None;
        }

        let content = paragraphs.join("\n");
        let word_count = content.chars().count();
        Some(
            ChapterRecord::new(chapter_id, title, content).with_extra("word_count", word_count),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DETAIL_PAGE: &str = r#"<html><body>
        <div class="product-gallery"><img src="https://www.esjzone.cc/cover/42.jpg" /></div>
        <h2 class="p-t-10 text-normal">測試輕小說</h2>
        <ul class="book-detail">
            <li>作者: <a href="/member/100.html">某翻譯</a></li>
            <li>更新日期: 2024-06-10</li>
            <li>連載狀態: 連載中</li>
            <li>總字數: 123456</li>
        </ul>
        <div class="description"><p>第一段簡介</p><p>第二段簡介</p></div>
        <div id="chapterList">
            <a href="https://www.esjzone.cc/forum/42/9001.html"><p>第一話</p></a>
            <a href="https://www.esjzone.cc/forum/42/9002.html"><p>第二話</p></a>
            <a href="https://blog.example.com/ch3"><p>外部連結</p></a>
        </div>
    </body></html>"#;

    const FORUM_PAGE: &str = r#"<html><body>
        <h2>第一話</h2>
        <div class="forum-content">
            <p>内容一。</p>
            <p></p>
            <p>内容二。</p>
        </div>
    </body></html>"#;

    #[test]
    fn parses_detail_page() {
        let parser = EsjzoneParser::new();
        let info = parser.parse_book_info(&[DETAIL_PAGE.to_string()]).unwrap();

        assert_eq!(info.book_name, "測試輕小說");
        assert_eq!(info.author, "某翻譯");
        assert_eq!(info.update_time, "2024-06-10 00:00:00");
        assert_eq!(info.serial_status, "連載中");
        assert_eq!(info.word_count, "123456");
        assert_eq!(info.summary, "第一段簡介\n第二段簡介");
        assert_eq!(info.cover_url, "https://www.esjzone.cc/cover/42.jpg");

        let chapters = &info.volumes[0].chapters;
        assert_eq!(chapters.len(), 3);
        assert_eq!(chapters[0].chapter_id.as_deref(), Some("9001"));
        assert_eq!(chapters[1].title, "第二話");
        assert_eq!(chapters[2].chapter_id, None, "external link must not get an id");
    }

    #[test]
    fn page_without_title_is_not_found() {
        let parser = EsjzoneParser::new();
        assert!(parser.parse_book_info(&["<html></html>".to_string()]).is_none());
        assert!(parser.parse_book_info(&[]).is_none());
    }

    #[test]
    fn parses_forum_chapter() {
        let parser = EsjzoneParser::new();
        let record = parser.parse_chapter(&[FORUM_PAGE.to_string()], "9001").unwrap();

        assert_eq!(record.id, "9001");
        assert_eq!(record.title, "第一話");
        assert_eq!(record.content, "内容一。\n内容二。");
        assert_eq!(record.next_chapter_id(), None);
    }

    #[test]
    fn empty_forum_page_yields_none() {
        let parser = EsjzoneParser::new();
        assert!(parser
            .parse_chapter(&["<html><body></body></html>".to_string()], "9001")
            .is_none());
    }
}
