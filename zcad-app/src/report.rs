use std::collections::BTreeMap;
use std::fmt::Write;

use zcad_engine::scene::Scene;

/// 文档摘要：实体分类计数、图层、选中集、历史深度与范围。
pub fn summary(scene: &Scene) -> String {
    let document = scene.document();
    let mut kinds: BTreeMap<&'static str, usize> = BTreeMap::new();
    for entity in document.entities() {
        *kinds.entry(entity.kind_name()).or_default() += 1;
    }

    let mut out = String::new();
    let _ = writeln!(out, "文档: {} 个实体", document.len());
    for (kind, count) in &kinds {
        let _ = writeln!(out, "  {kind}: {count}");
    }
    let layers: Vec<_> = document
        .registry()
        .layers()
        .map(|layer| layer.name.as_str())
        .collect();
    let _ = writeln!(out, "图层: {} (当前 {})", layers.join(", "), scene.current_layer());
    let _ = writeln!(out, "选中: {}", document.selection_len());
    let history = scene.history();
    let _ = writeln!(out, "撤销: {} / 重做: {}", history.undo_len(), history.redo_len());
    match document.bounds() {
        Some(area) => {
            let _ = writeln!(
                out,
                "范围: ({:.4}, {:.4}) - ({:.4}, {:.4})",
                area.min().x(),
                area.min().y(),
                area.max().x(),
                area.max().y()
            );
        }
        None => {
            let _ = writeln!(out, "范围: 空");
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use zcad_engine::command::{CommandBus, CommandContext};

    use super::*;

    #[test]
    fn summary_counts_kinds_and_history() {
        let mut scene = Scene::new();
        let bus = CommandBus::new();
        let mut context = CommandContext { scene: &mut scene };
        for line in ["circle 0,0 1", "circle 4,0 1", "line 0,0 4,0"] {
            bus.run_line(line, &mut context).unwrap();
        }
        let text = summary(&scene);
        assert!(text.contains("文档: 3 个实体"));
        assert!(text.contains("  circle: 2"));
        assert!(text.contains("  line: 1"));
        assert!(text.contains("图层: 0 (当前 0)"));
        assert!(text.contains("撤销: 3 / 重做: 0"));
        assert!(text.contains("范围: (-1.0000, -1.0000) - (5.0000, 1.0000)"));
    }

    #[test]
    fn empty_document_has_no_bounds() {
        let text = summary(&Scene::new());
        assert!(text.contains("文档: 0 个实体"));
        assert!(text.contains("范围: 空"));
    }
}
