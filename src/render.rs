use anyhow::Context;
use std::fs::File;
use std::io::Write;
use std::path::Path;
use zip::write::FileOptions;
use zip::{CompressionMethod, ZipWriter};

use crate::bulletin::{BulletinPlan, CellAlign, CellPlan, COLUMN_WIDTHS_DXA};

/// Rendering collaborator seam: materializes the abstract bulletin plan at a
/// target path. The daemon ships one implementation; a front-end with its own
/// document stack can consume the plan JSON instead.
pub trait BulletinRenderer {
    fn render(&self, plan: &BulletinPlan, path: &Path) -> anyhow::Result<()>;
}

/// Minimal WordprocessingML writer: one document part inside the OPC zip
/// container, enough for the bulletin's merges, borders and shading.
pub struct DocxRenderer;

const CONTENT_TYPES_XML: &str = concat!(
    r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>"#,
    r#"<Types xmlns="http://schemas.openxmlformats.org/package/2006/content-types">"#,
    r#"<Default Extension="rels" ContentType="application/vnd.openxmlformats-package.relationships+xml"/>"#,
    r#"<Default Extension="xml" ContentType="application/xml"/>"#,
    r#"<Override PartName="/word/document.xml" ContentType="application/vnd.openxmlformats-officedocument.wordprocessingml.document.main+xml"/>"#,
    r#"</Types>"#
);

const RELS_XML: &str = concat!(
    r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>"#,
    r#"<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships">"#,
    r#"<Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/officeDocument" Target="word/document.xml"/>"#,
    r#"</Relationships>"#
);

impl BulletinRenderer for DocxRenderer {
    fn render(&self, plan: &BulletinPlan, path: &Path) -> anyhow::Result<()> {
        let out_file = File::create(path)
            .with_context(|| format!("failed to create output file {}", path.to_string_lossy()))?;
        let mut zip = ZipWriter::new(out_file);
        let opts = FileOptions::default().compression_method(CompressionMethod::Deflated);

        zip.start_file("[Content_Types].xml", opts)
            .context("failed to start content-types entry")?;
        zip.write_all(CONTENT_TYPES_XML.as_bytes())
            .context("failed to write content-types entry")?;

        zip.start_file("_rels/.rels", opts)
            .context("failed to start relationships entry")?;
        zip.write_all(RELS_XML.as_bytes())
            .context("failed to write relationships entry")?;

        zip.start_file("word/document.xml", opts)
            .context("failed to start document entry")?;
        zip.write_all(document_xml(plan).as_bytes())
            .context("failed to write document entry")?;

        zip.finish().context("failed to finalize document container")?;
        Ok(())
    }
}

fn escape_xml(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for ch in text.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            _ => out.push(ch),
        }
    }
    out
}

fn paragraph_xml(text: &str, align: &str, bold: bool, half_point_size: u32) -> String {
    let bold_tag = if bold { "<w:b/>" } else { "" };
    format!(
        concat!(
            "<w:p><w:pPr><w:jc w:val=\"{align}\"/>",
            "<w:spacing w:after=\"60\" w:line=\"240\" w:lineRule=\"auto\"/></w:pPr>",
            "<w:r><w:rPr>",
            "<w:rFonts w:ascii=\"Times New Roman\" w:hAnsi=\"Times New Roman\"/>",
            "{bold}<w:sz w:val=\"{sz}\"/><w:szCs w:val=\"{sz}\"/></w:rPr>",
            "<w:t xml:space=\"preserve\">{text}</w:t></w:r></w:p>"
        ),
        align = align,
        bold = bold_tag,
        sz = half_point_size,
        text = escape_xml(text),
    )
}

fn border_side_xml(tag: &str, present: bool) -> String {
    if present {
        format!(
            "<w:{} w:val=\"single\" w:sz=\"4\" w:space=\"0\" w:color=\"000000\"/>",
            tag
        )
    } else {
        format!("<w:{} w:val=\"nil\"/>", tag)
    }
}

fn cell_xml(cell: &CellPlan, width_dxa: i64) -> String {
    let mut tc_pr = String::new();
    tc_pr.push_str(&format!(
        "<w:tcW w:w=\"{}\" w:type=\"dxa\"/>",
        width_dxa
    ));
    if cell.span > 1 {
        tc_pr.push_str(&format!("<w:gridSpan w:val=\"{}\"/>", cell.span));
    }
    tc_pr.push_str("<w:tcBorders>");
    tc_pr.push_str(&border_side_xml("top", cell.borders.top));
    tc_pr.push_str(&border_side_xml("left", cell.borders.left));
    tc_pr.push_str(&border_side_xml("bottom", cell.borders.bottom));
    tc_pr.push_str(&border_side_xml("right", cell.borders.right));
    tc_pr.push_str("</w:tcBorders>");
    if cell.shaded {
        tc_pr.push_str("<w:shd w:val=\"clear\" w:color=\"auto\" w:fill=\"D3D3D3\"/>");
    }
    tc_pr.push_str("<w:vAlign w:val=\"center\"/>");

    let align = match cell.align {
        CellAlign::Left => "left",
        CellAlign::Center => "center",
    };
    format!(
        "<w:tc><w:tcPr>{}</w:tcPr>{}</w:tc>",
        tc_pr,
        paragraph_xml(&cell.text, align, cell.bold, 22),
    )
}

fn document_xml(plan: &BulletinPlan) -> String {
    let mut body = String::new();

    for (i, line) in plan.heading.approval_lines.iter().enumerate() {
        body.push_str(&paragraph_xml(line, "right", i == 0, 16));
    }
    body.push_str(&paragraph_xml(&plan.heading.title, "center", true, 30));
    for line in &plan.heading.date_lines {
        body.push_str(&paragraph_xml(line, "center", true, 30));
    }

    body.push_str("<w:tbl><w:tblPr><w:tblLayout w:type=\"fixed\"/></w:tblPr><w:tblGrid>");
    for width in COLUMN_WIDTHS_DXA {
        body.push_str(&format!("<w:gridCol w:w=\"{}\"/>", width));
    }
    body.push_str("</w:tblGrid>");

    for row in &plan.grid.rows {
        debug_assert_eq!(row.total_span(), COLUMN_WIDTHS_DXA.len());
        body.push_str("<w:tr>");
        let mut column = 0usize;
        for cell in &row.cells {
            let width: i64 = plan.grid.column_widths_dxa[column..column + cell.span]
                .iter()
                .sum();
            body.push_str(&cell_xml(cell, width));
            column += cell.span;
        }
        body.push_str("</w:tr>");
    }
    body.push_str("</w:tbl>");

    // 1 cm top/bottom, 1.5 cm left/right page margins.
    body.push_str(
        "<w:sectPr><w:pgMar w:top=\"567\" w:bottom=\"567\" w:left=\"850\" w:right=\"850\"/></w:sectPr>",
    );

    format!(
        concat!(
            "<?xml version=\"1.0\" encoding=\"UTF-8\" standalone=\"yes\"?>",
            "<w:document xmlns:w=\"http://schemas.openxmlformats.org/wordprocessingml/2006/main\">",
            "<w:body>{}</w:body></w:document>"
        ),
        body
    )
}
