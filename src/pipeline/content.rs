//! Assemble the user turn: one intro text part, then every page in order.

use super::render::RenderedPage;
use crate::provider::ContentPart;

pub fn build_content_parts(intro: &str, pages: &[RenderedPage]) -> Vec<ContentPart> {
    let mut ordered: Vec<&RenderedPage> = pages.iter().collect();
    ordered.sort_by_key(|p| p.page_num);

    std::iter::once(ContentPart::text(intro))
        .chain(ordered.into_iter().map(|p| ContentPart::png(p.png_base64.clone())))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn page(n: usize) -> RenderedPage {
        RenderedPage {
            page_num: n,
            png_base64: format!("P{n}"),
            width: 10,
            height: 10,
        }
    }

    #[test]
    fn intro_first_then_pages_in_order() {
        let parts = build_content_parts("intro", &[page(2), page(1), page(3)]);
        assert_eq!(parts.len(), 4);
        assert_eq!(parts[0], ContentPart::text("intro"));
        let data: Vec<String> = parts[1..]
            .iter()
            .filter_map(|p| match p {
                ContentPart::Image { data, detail, .. } => {
                    assert_eq!(detail, "high");
                    Some(data.clone())
                }
                _ => None,
            })
            .collect();
        assert_eq!(data, vec!["P1", "P2", "P3"]);
    }
}
