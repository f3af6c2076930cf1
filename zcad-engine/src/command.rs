//! 命令总线：按名称调用构建器与文档操作。
//!
//! 命令行形如 `circle 0,0 5 layer=GEOM`：坐标写作 `x,y`，角度以度为单位，
//! `key=value` 形式的参数可以替代同名的位置参数，含空格的文本用双引号包裹。
//! 所有修改都以撤销记录的形式提交。

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use tracing::{debug, warn};
use zcad_core::builder::{
    ArcBuilder, CircleBuilder, EntityBuilder, LineBuilder, PointBuilder, PolylineBuilder, Tangency,
    TextBuilder,
};
use zcad_core::entity::{Entity, EntityId, EntityRef, HAlign, VAlign};
use zcad_core::errors::CadError;
use zcad_core::geometry::{Area, Coordinate};
use zcad_core::meta::{Color, Layer, MetaInfo, MetaValue};

use crate::document::Document;
use crate::errors::EngineError;
use crate::scene::Scene;
use crate::undo::{DocumentOperation, UndoRecord};

#[derive(Debug, Clone, Default, PartialEq)]
pub struct CommandRequest {
    pub name: String,
    pub positional: Vec<String>,
    pub keyed: BTreeMap<String, String>,
}

impl CommandRequest {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn arg(mut self, value: impl Into<String>) -> Self {
        self.positional.push(value.into());
        self
    }

    pub fn key(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.keyed.insert(key.into(), value.into());
        self
    }

    /// 解析一行命令。空行与 `#` 开头的注释返回 `None`。
    pub fn parse(line: &str) -> Result<Option<Self>, EngineError> {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            return Ok(None);
        }
        let mut tokens = tokenize(line)?.into_iter();
        let Some(name) = tokens.next() else {
            return Ok(None);
        };
        let mut request = Self::new(name.value);
        for token in tokens {
            match token.value.split_once('=') {
                Some((key, value)) if !token.quoted && !key.is_empty() => {
                    request.keyed.insert(key.to_string(), value.to_string());
                }
                _ => request.positional.push(token.value),
            }
        }
        Ok(Some(request))
    }
}

struct Token {
    value: String,
    quoted: bool,
}

fn tokenize(line: &str) -> Result<Vec<Token>, EngineError> {
    let mut tokens = Vec::new();
    let mut chars = line.chars().peekable();
    while let Some(&c) = chars.peek() {
        if c.is_whitespace() {
            chars.next();
            continue;
        }
        if c == '"' {
            chars.next();
            let mut value = String::new();
            let mut closed = false;
            for c in chars.by_ref() {
                if c == '"' {
                    closed = true;
                    break;
                }
                value.push(c);
            }
            if !closed {
                return Err(EngineError::InvalidArgument {
                    argument: "line".to_string(),
                    value: line.to_string(),
                });
            }
            tokens.push(Token {
                value,
                quoted: true,
            });
        } else {
            let mut value = String::new();
            while let Some(&c) = chars.peek() {
                if c.is_whitespace() {
                    break;
                }
                value.push(c);
                chars.next();
            }
            tokens.push(Token {
                value,
                quoted: false,
            });
        }
    }
    Ok(tokens)
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct CommandResponse {
    pub message: String,
    /// 本次命令新建的实体。
    pub created: Vec<EntityId>,
}

impl CommandResponse {
    pub fn ok(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            created: Vec::new(),
        }
    }

    pub fn created(message: impl Into<String>, created: Vec<EntityId>) -> Self {
        Self {
            message: message.into(),
            created,
        }
    }
}

pub struct CommandContext<'a> {
    pub scene: &'a mut Scene,
}

pub trait CommandHandler: Send + Sync {
    fn name(&self) -> &'static str;
    fn execute(
        &self,
        request: &CommandRequest,
        context: &mut CommandContext<'_>,
    ) -> Result<CommandResponse, EngineError>;
}

type CommandFn = fn(&Arguments<'_>, &mut Scene) -> Result<CommandResponse, EngineError>;

/// 以普通函数实现的命令。
struct FnCommand {
    name: &'static str,
    run: CommandFn,
}

impl CommandHandler for FnCommand {
    fn name(&self) -> &'static str {
        self.name
    }

    fn execute(
        &self,
        request: &CommandRequest,
        context: &mut CommandContext<'_>,
    ) -> Result<CommandResponse, EngineError> {
        (self.run)(&Arguments { request }, context.scene)
    }
}

pub struct CommandBus {
    handlers: HashMap<&'static str, Box<dyn CommandHandler>>,
}

impl CommandBus {
    pub fn new() -> Self {
        let mut bus = Self {
            handlers: HashMap::new(),
        };
        let builtin: [(&'static str, CommandFn); 25] = [
            ("point", create_point),
            ("line", create_line),
            ("circle", create_circle),
            ("arc", create_arc),
            ("arc3p", create_arc_through_points),
            ("polyline", create_polyline),
            ("text", create_text),
            ("tan_circle", create_tangent_circle),
            ("move", move_selection),
            ("copy", copy_selection),
            ("rotate", rotate_selection),
            ("scale", scale_selection),
            ("mirror", mirror_selection),
            ("delete", delete_selection),
            ("select", select_entities),
            ("clear_selection", clear_selection),
            ("add_layer", add_layer),
            ("update_layer", update_layer),
            ("set_layer", set_layer),
            ("remove_layer", remove_layer),
            ("undo", undo),
            ("redo", redo),
            ("clear_undo", clear_undo),
            ("snap", snap),
            ("pick", pick),
        ];
        for (name, run) in builtin {
            bus.register(FnCommand { name, run });
        }
        bus
    }

    pub fn register<H: CommandHandler + 'static>(&mut self, handler: H) {
        self.handlers.insert(handler.name(), Box::new(handler));
    }

    pub fn dispatch(
        &self,
        request: &CommandRequest,
        context: &mut CommandContext<'_>,
    ) -> Result<CommandResponse, EngineError> {
        let handler = self
            .handlers
            .get(request.name.as_str())
            .ok_or_else(|| EngineError::UnknownCommand(request.name.clone()))?;
        debug!(command = %request.name, "执行命令");
        handler.execute(request, context).inspect_err(|err| {
            warn!(command = %request.name, error = %err, "命令执行失败");
        })
    }

    /// 解析并执行一行命令，空行与注释返回 `None`。
    pub fn run_line(
        &self,
        line: &str,
        context: &mut CommandContext<'_>,
    ) -> Result<Option<CommandResponse>, EngineError> {
        match CommandRequest::parse(line)? {
            Some(request) => self.dispatch(&request, context).map(Some),
            None => Ok(None),
        }
    }

    /// 已注册的命令名（按字母排序）。
    pub fn available_commands(&self) -> Vec<&'static str> {
        let mut names: Vec<_> = self.handlers.keys().copied().collect();
        names.sort_unstable();
        names
    }
}

impl Default for CommandBus {
    fn default() -> Self {
        Self::new()
    }
}

/// 参数读取：`key=value` 优先，其次是对应位置的参数。
struct Arguments<'a> {
    request: &'a CommandRequest,
}

impl<'a> Arguments<'a> {
    fn raw(&self, index: usize, key: &str) -> Option<&'a str> {
        self.request
            .keyed
            .get(key)
            .or_else(|| self.request.positional.get(index))
            .map(String::as_str)
    }

    fn keyed(&self, key: &str) -> Option<&'a str> {
        self.request.keyed.get(key).map(String::as_str)
    }

    fn required(&self, index: usize, key: &str) -> Result<&'a str, EngineError> {
        self.raw(index, key)
            .ok_or_else(|| EngineError::MissingArgument {
                command: self.request.name.clone(),
                argument: key.to_string(),
            })
    }

    fn number(&self, index: usize, key: &str) -> Result<f64, EngineError> {
        parse_number(key, self.required(index, key)?)
    }

    fn point(&self, index: usize, key: &str) -> Result<Coordinate, EngineError> {
        parse_point(key, self.required(index, key)?)
    }

    fn angle(&self, index: usize, key: &str) -> Result<f64, EngineError> {
        Ok(self.number(index, key)?.to_radians())
    }

    fn flag(&self, key: &str) -> Result<Option<bool>, EngineError> {
        self.keyed(key).map(|value| parse_bool(key, value)).transpose()
    }

    /// 实体引用：`12` 或 `#12` 为 ID，`@i` 为绘制顺序中的位置，负数从末尾数起。
    fn id(&self, index: usize, key: &str, document: &Document) -> Result<EntityId, EngineError> {
        let value = self.required(index, key)?;
        if let Some(position) = value.strip_prefix('@') {
            let position: i64 = position.parse().map_err(|_| invalid(key, value))?;
            let resolved = if position < 0 {
                document.len() as i64 + position
            } else {
                position
            };
            return usize::try_from(resolved)
                .ok()
                .and_then(|at| document.entities().nth(at))
                .map(|entity| entity.id())
                .ok_or_else(|| invalid(key, value));
        }
        value
            .trim_start_matches('#')
            .parse::<u64>()
            .map(EntityId::new)
            .map_err(|_| invalid(key, value))
    }

    /// 新实体的图层：`layer=` 或场景当前图层。
    fn layer(&self, scene: &Scene) -> String {
        self.keyed("layer")
            .map_or_else(|| scene.current_layer().to_string(), str::to_string)
    }

    /// `color=#rrggbb` 与 `width=` 组成的实体样式。
    fn meta(&self) -> Result<Option<Arc<MetaInfo>>, EngineError> {
        let mut meta = MetaInfo::new();
        if let Some(value) = self.keyed("color") {
            let color = Color::from_hex(value).ok_or_else(|| invalid("color", value))?;
            meta = meta.with(MetaValue::Color(color));
        }
        if let Some(value) = self.keyed("width") {
            meta = meta.with(MetaValue::LineWidth(parse_number("width", value)?));
        }
        Ok((!meta.is_empty()).then(|| Arc::new(meta)))
    }
}

fn invalid(argument: &str, value: &str) -> EngineError {
    EngineError::InvalidArgument {
        argument: argument.to_string(),
        value: value.to_string(),
    }
}

fn parse_number(argument: &str, value: &str) -> Result<f64, EngineError> {
    value
        .parse::<f64>()
        .ok()
        .filter(|number| number.is_finite())
        .ok_or_else(|| invalid(argument, value))
}

fn parse_point(argument: &str, value: &str) -> Result<Coordinate, EngineError> {
    let (x, y) = value.split_once(',').ok_or_else(|| invalid(argument, value))?;
    let x = x.trim().parse::<f64>().ok().filter(|v| v.is_finite());
    let y = y.trim().parse::<f64>().ok().filter(|v| v.is_finite());
    match (x, y) {
        (Some(x), Some(y)) => Ok(Coordinate::new(x, y)),
        _ => Err(invalid(argument, value)),
    }
}

/// `x,y` 或 `x,y,bulge`。
fn parse_vertex(argument: &str, value: &str) -> Result<(Coordinate, f64), EngineError> {
    match value.rsplit_once(',') {
        Some((point, bulge)) if point.contains(',') => {
            Ok((parse_point(argument, point)?, parse_number(argument, bulge.trim())?))
        }
        _ => Ok((parse_point(argument, value)?, 0.0)),
    }
}

fn parse_bool(argument: &str, value: &str) -> Result<bool, EngineError> {
    match value.to_ascii_lowercase().as_str() {
        "true" | "yes" | "on" | "1" => Ok(true),
        "false" | "no" | "off" | "0" => Ok(false),
        _ => Err(invalid(argument, value)),
    }
}

/// 为构建器填充图层与样式。
fn prepare<B: EntityBuilder>(builder: B, args: &Arguments<'_>, scene: &Scene) -> Result<B, EngineError> {
    Ok(builder
        .set_layer(args.layer(scene))
        .set_meta_info(args.meta()?))
}

fn commit_new(scene: &mut Scene, label: &str, entity: Entity) -> Result<CommandResponse, EngineError> {
    let id = entity.id();
    let kind = entity.kind_name();
    scene.execute(UndoRecord::new(label, vec![DocumentOperation::add(entity)]))?;
    Ok(CommandResponse::created(format!("已创建{kind} {id}"), vec![id]))
}

fn create_point(args: &Arguments<'_>, scene: &mut Scene) -> Result<CommandResponse, EngineError> {
    let entity = prepare(PointBuilder::new(), args, scene)?
        .set_position(args.point(0, "at")?)
        .build()?;
    commit_new(scene, "point", entity)
}

fn create_line(args: &Arguments<'_>, scene: &mut Scene) -> Result<CommandResponse, EngineError> {
    let entity = prepare(LineBuilder::new(), args, scene)?
        .set_start(args.point(0, "start")?)
        .set_end(args.point(1, "end")?)
        .build()?;
    commit_new(scene, "line", entity)
}

fn create_circle(args: &Arguments<'_>, scene: &mut Scene) -> Result<CommandResponse, EngineError> {
    let entity = prepare(CircleBuilder::new(), args, scene)?
        .set_center(args.point(0, "center")?)
        .set_radius(args.number(1, "radius")?)
        .build()?;
    commit_new(scene, "circle", entity)
}

fn create_arc(args: &Arguments<'_>, scene: &mut Scene) -> Result<CommandResponse, EngineError> {
    let entity = prepare(ArcBuilder::new(), args, scene)?
        .set_center(args.point(0, "center")?)
        .set_radius(args.number(1, "radius")?)
        .set_start_angle(args.angle(2, "start")?)
        .set_end_angle(args.angle(3, "end")?)
        .build()?;
    commit_new(scene, "arc", entity)
}

fn create_arc_through_points(
    args: &Arguments<'_>,
    scene: &mut Scene,
) -> Result<CommandResponse, EngineError> {
    let builder = ArcBuilder::from_three_points(
        args.point(0, "start")?,
        args.point(1, "through")?,
        args.point(2, "end")?,
    )?;
    let entity = prepare(builder, args, scene)?.build()?;
    commit_new(scene, "arc", entity)
}

/// `polyline x,y[,bulge] ... [closed=true]`，顶点至少两个。
fn create_polyline(args: &Arguments<'_>, scene: &mut Scene) -> Result<CommandResponse, EngineError> {
    let mut builder = prepare(PolylineBuilder::new(), args, scene)?;
    for value in &args.request.positional {
        let (position, bulge) = parse_vertex("vertex", value)?;
        builder = builder.add_vertex_with_bulge(position, bulge);
    }
    if let Some(closed) = args.flag("closed")? {
        builder = builder.set_closed(closed);
    }
    commit_new(scene, "polyline", builder.build()?)
}

fn create_text(args: &Arguments<'_>, scene: &mut Scene) -> Result<CommandResponse, EngineError> {
    let mut builder = prepare(TextBuilder::new(), args, scene)?
        .set_insertion_point(args.point(0, "at")?)
        .set_height(args.number(1, "height")?)
        .set_text_value(args.required(2, "value")?);
    if let Some(value) = args.keyed("angle") {
        builder = builder.set_angle(parse_number("angle", value)?.to_radians());
    }
    if let Some(value) = args.keyed("style") {
        builder = builder.set_style(value);
    }
    if let Some(value) = args.keyed("halign") {
        builder = builder.set_halign(HAlign::from_name(value).ok_or_else(|| invalid("halign", value))?);
    }
    if let Some(value) = args.keyed("valign") {
        builder = builder.set_valign(VAlign::from_name(value).ok_or_else(|| invalid("valign", value))?);
    }
    if let Some(bold) = args.flag("bold")? {
        builder = builder.set_bold(bold);
    }
    if let Some(italic) = args.flag("italic")? {
        builder = builder.set_italic(italic);
    }
    commit_new(scene, "text", builder.build()?)
}

/// `tan_circle ID1 ID2 ID3 [S1 S2 S3]`，符号为 1（内切）或 -1（外切），默认外切。
fn create_tangent_circle(
    args: &Arguments<'_>,
    scene: &mut Scene,
) -> Result<CommandResponse, EngineError> {
    let mut circles = Vec::with_capacity(3);
    let mut tangency = [Tangency::External; 3];
    for (slot, kind) in tangency.iter_mut().enumerate() {
        let id = args.id(slot, &format!("c{}", slot + 1), scene.document())?;
        let entity = scene
            .document()
            .entity(id)
            .cloned()
            .ok_or(EngineError::EntityNotFound(id.get()))?;
        circles.push(entity);

        let key = format!("s{}", slot + 1);
        if let Some(value) = args.raw(slot + 3, &key) {
            let sign = value.parse::<i32>().ok().and_then(Tangency::from_sign);
            *kind = sign.ok_or_else(|| invalid(&key, value))?;
        }
    }

    let mut builder = prepare(CircleBuilder::new(), args, scene)?;
    builder.three_tan_constructor([&*circles[0], &*circles[1], &*circles[2]], tangency)?;
    commit_new(scene, "tan_circle", builder.build()?)
}

fn selected(scene: &Scene) -> Result<Vec<EntityRef>, EngineError> {
    let document = scene.document();
    let entities: Vec<_> = document
        .selection()
        .filter_map(|id| document.entity(id).cloned())
        .collect();
    if entities.is_empty() {
        return Err(EngineError::EmptySelection);
    }
    Ok(entities)
}

/// 以同 ID 的新版本替换所有选中实体。
fn transform_selection(
    scene: &mut Scene,
    label: &str,
    transform: impl Fn(&Entity) -> Result<Entity, CadError>,
) -> Result<CommandResponse, EngineError> {
    let operations = selected(scene)?
        .iter()
        .map(|entity| Ok(DocumentOperation::replace(transform(entity)?)))
        .collect::<Result<Vec<_>, EngineError>>()?;
    let count = operations.len();
    scene.execute(UndoRecord::new(label, operations))?;
    Ok(CommandResponse::ok(format!("{label}: {count} 个实体")))
}

fn move_selection(args: &Arguments<'_>, scene: &mut Scene) -> Result<CommandResponse, EngineError> {
    let offset = args.point(0, "offset")?;
    transform_selection(scene, "move", |entity| Ok(entity.move_by(offset)))
}

fn rotate_selection(args: &Arguments<'_>, scene: &mut Scene) -> Result<CommandResponse, EngineError> {
    let center = args.point(0, "center")?;
    let angle = args.angle(1, "angle")?;
    transform_selection(scene, "rotate", |entity| Ok(entity.rotate(center, angle)))
}

fn scale_selection(args: &Arguments<'_>, scene: &mut Scene) -> Result<CommandResponse, EngineError> {
    let center = args.point(0, "center")?;
    let factor = args.number(1, "factor")?;
    transform_selection(scene, "scale", |entity| entity.scale(center, factor))
}

fn mirror_selection(args: &Arguments<'_>, scene: &mut Scene) -> Result<CommandResponse, EngineError> {
    let a = args.point(0, "a")?;
    let b = args.point(1, "b")?;
    transform_selection(scene, "mirror", |entity| entity.mirror(a, b))
}

fn copy_selection(args: &Arguments<'_>, scene: &mut Scene) -> Result<CommandResponse, EngineError> {
    let offset = args.point(0, "offset")?;
    let copies: Vec<Entity> = selected(scene)?
        .iter()
        .map(|entity| entity.copy(offset))
        .collect();
    let created: Vec<_> = copies.iter().map(Entity::id).collect();
    let operations = copies.into_iter().map(DocumentOperation::add).collect();
    scene.execute(UndoRecord::new("copy", operations))?;
    Ok(CommandResponse::created(
        format!("已复制 {} 个实体", created.len()),
        created,
    ))
}

fn delete_selection(_: &Arguments<'_>, scene: &mut Scene) -> Result<CommandResponse, EngineError> {
    let operations: Vec<_> = selected(scene)?
        .iter()
        .map(|entity| DocumentOperation::remove(entity.id()))
        .collect();
    let count = operations.len();
    scene.execute(UndoRecord::new("delete", operations))?;
    Ok(CommandResponse::ok(format!("已删除 {count} 个实体")))
}

/// `select all`、`select ID...` 或 `select area=x0,y0,x1,y1 [crossing=true]`。
fn select_entities(args: &Arguments<'_>, scene: &mut Scene) -> Result<CommandResponse, EngineError> {
    let document = scene.document_mut();
    let ids: Vec<EntityId> = if let Some(value) = args.keyed("area") {
        let numbers: Vec<f64> = value
            .split(',')
            .map(|part| parse_number("area", part.trim()))
            .collect::<Result<_, _>>()?;
        let [x0, y0, x1, y1] = numbers[..] else {
            return Err(invalid("area", value));
        };
        let area = Area::new(Coordinate::new(x0, y0), Coordinate::new(x1, y1));
        if args.flag("crossing")?.unwrap_or(false) {
            document.entities_crossing_area(&area)
        } else {
            document.entities_in_area(&area)
        }
    } else if args.raw(0, "ids") == Some("all") {
        document.entities().map(|entity| entity.id()).collect()
    } else {
        if args.request.positional.is_empty() {
            return Err(EngineError::MissingArgument {
                command: args.request.name.clone(),
                argument: "ids".to_string(),
            });
        }
        (0..args.request.positional.len())
            .map(|index| args.id(index, "ids", document))
            .collect::<Result<_, _>>()?
    };
    document.set_selection(ids)?;
    Ok(CommandResponse::ok(format!(
        "已选中 {} 个实体",
        document.selection_len()
    )))
}

fn clear_selection(_: &Arguments<'_>, scene: &mut Scene) -> Result<CommandResponse, EngineError> {
    scene.document_mut().clear_selection();
    Ok(CommandResponse::ok("选中集已清空"))
}

/// 把 `visible=`/`locked=`/`frozen=`/`color=` 应用到图层。
fn apply_layer_flags(args: &Arguments<'_>, layer: &mut Layer) -> Result<(), EngineError> {
    if let Some(visible) = args.flag("visible")? {
        layer.is_visible = visible;
    }
    if let Some(locked) = args.flag("locked")? {
        layer.is_locked = locked;
    }
    if let Some(frozen) = args.flag("frozen")? {
        layer.is_frozen = frozen;
    }
    if let Some(value) = args.keyed("color") {
        let color = Color::from_hex(value).ok_or_else(|| invalid("color", value))?;
        layer.meta = layer.meta.clone().with(MetaValue::Color(color));
    }
    Ok(())
}

fn add_layer(args: &Arguments<'_>, scene: &mut Scene) -> Result<CommandResponse, EngineError> {
    let name = args.required(0, "name")?;
    let mut layer = Layer::new(name);
    apply_layer_flags(args, &mut layer)?;
    scene.execute(UndoRecord::new("add_layer", vec![DocumentOperation::AddLayer(layer)]))?;
    Ok(CommandResponse::ok(format!("已添加图层 {name}")))
}

fn update_layer(args: &Arguments<'_>, scene: &mut Scene) -> Result<CommandResponse, EngineError> {
    let name = args.required(0, "name")?;
    let mut layer = scene
        .document()
        .layer(name)
        .cloned()
        .ok_or_else(|| EngineError::LayerNotFound(name.to_string()))?;
    apply_layer_flags(args, &mut layer)?;
    scene.execute(UndoRecord::new("update_layer", vec![DocumentOperation::UpdateLayer(layer)]))?;
    Ok(CommandResponse::ok(format!("已更新图层 {name}")))
}

fn set_layer(args: &Arguments<'_>, scene: &mut Scene) -> Result<CommandResponse, EngineError> {
    let name = args.required(0, "name")?;
    scene.set_current_layer(name)?;
    Ok(CommandResponse::ok(format!("当前图层: {name}")))
}

fn remove_layer(args: &Arguments<'_>, scene: &mut Scene) -> Result<CommandResponse, EngineError> {
    let name = args.required(0, "name")?;
    if scene.current_layer() == name {
        return Err(EngineError::LayerInUse(name.to_string()));
    }
    scene.execute(UndoRecord::new(
        "remove_layer",
        vec![DocumentOperation::RemoveLayer(name.to_string())],
    ))?;
    Ok(CommandResponse::ok(format!("已移除图层 {name}")))
}

fn undo(_: &Arguments<'_>, scene: &mut Scene) -> Result<CommandResponse, EngineError> {
    let label = scene.undo()?;
    Ok(CommandResponse::ok(format!("已撤销 {label}")))
}

fn redo(_: &Arguments<'_>, scene: &mut Scene) -> Result<CommandResponse, EngineError> {
    let label = scene.redo()?;
    Ok(CommandResponse::ok(format!("已重做 {label}")))
}

fn clear_undo(_: &Arguments<'_>, scene: &mut Scene) -> Result<CommandResponse, EngineError> {
    scene.clear_undoable_stack();
    Ok(CommandResponse::ok("撤销历史已清空"))
}

fn snap(args: &Arguments<'_>, scene: &mut Scene) -> Result<CommandResponse, EngineError> {
    let candidate = args.point(0, "at")?;
    let message = match scene.snap().find_snap(candidate, scene.document()) {
        Some(hit) => format!(
            "{} ({:.4}, {:.4})",
            hit.kind.name(),
            hit.point.x(),
            hit.point.y()
        ),
        None => format!("none ({:.4}, {:.4})", candidate.x(), candidate.y()),
    };
    Ok(CommandResponse::ok(message))
}

/// 命中测试：`pick x,y [tolerance=]`，选中命中的实体。
fn pick(args: &Arguments<'_>, scene: &mut Scene) -> Result<CommandResponse, EngineError> {
    let point = args.point(0, "at")?;
    let tolerance = match args.keyed("tolerance") {
        Some(value) => parse_number("tolerance", value)?,
        None => scene.snap().settings().threshold,
    };
    let document = scene.document_mut();
    match document.entity_at(point, tolerance) {
        Some(id) => {
            document.set_selection([id])?;
            Ok(CommandResponse::ok(format!("已选中 {id}")))
        }
        None => Ok(CommandResponse::ok("未命中实体")),
    }
}

#[cfg(test)]
mod tests {
    use zcad_core::entity::Shape;

    use super::*;

    fn run(bus: &CommandBus, scene: &mut Scene, line: &str) -> Result<CommandResponse, EngineError> {
        let mut context = CommandContext { scene };
        bus.run_line(line, &mut context)
            .map(|response| response.expect("line is not empty"))
    }

    #[test]
    fn parses_positional_keyed_and_quoted_arguments() {
        let request = CommandRequest::parse(r#"text 1,2 2.5 "hello world" layer=ANNOT"#)
            .unwrap()
            .unwrap();
        assert_eq!(request.name, "text");
        assert_eq!(request.positional, vec!["1,2", "2.5", "hello world"]);
        assert_eq!(request.keyed.get("layer").map(String::as_str), Some("ANNOT"));

        assert!(CommandRequest::parse("   # comment").unwrap().is_none());
        assert!(matches!(
            CommandRequest::parse(r#"text 0,0 1 "open"#),
            Err(EngineError::InvalidArgument { .. })
        ));
    }

    #[test]
    fn creates_entities_and_undoes_them() {
        let bus = CommandBus::new();
        let mut scene = Scene::new();
        let response = run(&bus, &mut scene, "circle 0,0 5").unwrap();
        assert_eq!(response.created.len(), 1);
        run(&bus, &mut scene, "line start=0,0 end=10,0").unwrap();
        assert_eq!(scene.document().len(), 2);

        run(&bus, &mut scene, "undo").unwrap();
        run(&bus, &mut scene, "undo").unwrap();
        assert!(scene.document().is_empty());
        assert_eq!(
            run(&bus, &mut scene, "undo").unwrap_err(),
            EngineError::UndoHistoryEmpty
        );
        run(&bus, &mut scene, "redo").unwrap();
        assert_eq!(scene.document().len(), 1);
    }

    #[test]
    fn argument_errors_are_typed() {
        let bus = CommandBus::new();
        let mut scene = Scene::new();
        assert_eq!(
            run(&bus, &mut scene, "circle 0,0").unwrap_err(),
            EngineError::MissingArgument {
                command: "circle".into(),
                argument: "radius".into()
            }
        );
        assert_eq!(
            run(&bus, &mut scene, "circle 0;0 5").unwrap_err(),
            EngineError::InvalidArgument {
                argument: "center".into(),
                value: "0;0".into()
            }
        );
        assert!(matches!(
            run(&bus, &mut scene, "circle 0,0 -5").unwrap_err(),
            EngineError::Cad(CadError::InvalidGeometry(_))
        ));
        assert_eq!(
            run(&bus, &mut scene, "explode").unwrap_err(),
            EngineError::UnknownCommand("explode".into())
        );
        assert!(scene.document().is_empty());
        assert!(!scene.history().can_undo());
    }

    #[test]
    fn tangent_circle_from_existing_circles() {
        let bus = CommandBus::new();
        let mut scene = Scene::new();
        let mut ids = Vec::new();
        for line in ["circle 0,0 1", "circle 4,0 1", "circle 2,4 2"] {
            ids.extend(run(&bus, &mut scene, line).unwrap().created);
        }
        let response = run(&bus, &mut scene, "tan_circle @0 @1 @2 1 1 1").unwrap();
        let entity = scene.document().entity(response.created[0]).unwrap();
        let circle = entity.as_circle().unwrap();
        assert!(circle.center.approx_eq(Coordinate::new(2.0, 2.1), 1e-6));
        assert!((circle.radius - 3.9).abs() < 1e-6);

        let line = run(&bus, &mut scene, "line 0,0 1,1").unwrap().created[0];
        let command = format!("tan_circle {} {} {}", ids[0].get(), ids[1].get(), line.get());
        assert_eq!(
            run(&bus, &mut scene, &command).unwrap_err(),
            EngineError::Cad(CadError::InvalidEntityKind {
                expected: "circle",
                found: "line"
            })
        );
    }

    #[test]
    fn entities_can_be_referenced_by_paint_order() {
        let bus = CommandBus::new();
        let mut scene = Scene::new();
        let first = run(&bus, &mut scene, "point 0,0").unwrap().created[0];
        let last = run(&bus, &mut scene, "point 1,0").unwrap().created[0];

        run(&bus, &mut scene, "select @0").unwrap();
        assert!(scene.document().is_selected(first));
        run(&bus, &mut scene, "select @-1").unwrap();
        assert!(scene.document().is_selected(last));
        assert!(!scene.document().is_selected(first));

        assert_eq!(
            run(&bus, &mut scene, "select @2").unwrap_err(),
            EngineError::InvalidArgument {
                argument: "ids".into(),
                value: "@2".into()
            }
        );
        assert!(scene.document().is_selected(last));
    }

    #[test]
    fn transforms_apply_to_selection_as_one_record() {
        let bus = CommandBus::new();
        let mut scene = Scene::new();
        assert_eq!(
            run(&bus, &mut scene, "move 1,1").unwrap_err(),
            EngineError::EmptySelection
        );
        let a = run(&bus, &mut scene, "point 0,0").unwrap().created[0];
        let b = run(&bus, &mut scene, "point 1,0").unwrap().created[0];
        run(&bus, &mut scene, "select all").unwrap();
        run(&bus, &mut scene, "move 10,0").unwrap();

        let position = |scene: &Scene, id| match scene.document().entity(id).unwrap().shape() {
            Shape::Point(point) => point.position,
            other => panic!("unexpected {other:?}"),
        };
        assert!(position(&scene, a).approx_eq(Coordinate::new(10.0, 0.0), 1e-12));
        assert!(position(&scene, b).approx_eq(Coordinate::new(11.0, 0.0), 1e-12));

        run(&bus, &mut scene, "undo").unwrap();
        assert!(position(&scene, a).approx_eq(Coordinate::ORIGIN, 1e-12));
        assert!(position(&scene, b).approx_eq(Coordinate::new(1.0, 0.0), 1e-12));
    }

    #[test]
    fn mirror_with_text_selected_is_rejected_atomically() {
        let bus = CommandBus::new();
        let mut scene = Scene::new();
        run(&bus, &mut scene, "line 0,0 1,0").unwrap();
        run(&bus, &mut scene, r#"text 0,0 1 "label""#).unwrap();
        run(&bus, &mut scene, "select all").unwrap();
        let before = scene.document().snapshot();
        assert_eq!(
            run(&bus, &mut scene, "mirror 0,0 0,1").unwrap_err(),
            EngineError::Cad(CadError::UnsupportedOperation {
                operation: "mirror",
                kind: "text"
            })
        );
        assert_eq!(scene.document().snapshot(), before);
    }

    #[test]
    fn copy_and_delete_selection() {
        let bus = CommandBus::new();
        let mut scene = Scene::new();
        let original = run(&bus, &mut scene, "circle 0,0 1").unwrap().created[0];
        run(&bus, &mut scene, &format!("select {}", original.get())).unwrap();
        let copies = run(&bus, &mut scene, "copy 5,0").unwrap().created;
        assert_eq!(copies.len(), 1);
        assert_ne!(copies[0], original);
        assert_eq!(scene.document().len(), 2);

        run(&bus, &mut scene, "delete").unwrap();
        assert_eq!(scene.document().len(), 1);
        assert_eq!(scene.document().selection_len(), 0);
        run(&bus, &mut scene, "undo").unwrap();
        assert_eq!(scene.document().index_of(original), Some(0));
        assert!(scene.document().is_selected(original));
    }

    #[test]
    fn polyline_with_bulges_and_closure() {
        let bus = CommandBus::new();
        let mut scene = Scene::new();
        let id = run(&bus, &mut scene, "polyline 0,0 10,0,1 10,10 closed=true")
            .unwrap()
            .created[0];
        let Shape::Polyline(polyline) = scene.document().entity(id).unwrap().shape().clone() else {
            panic!("expected polyline");
        };
        assert_eq!(polyline.vertices.len(), 3);
        assert_eq!(polyline.vertices[1].bulge, 1.0);
        assert!(polyline.vertices[2].position.approx_eq(Coordinate::new(10.0, 10.0), 1e-12));
        assert!(polyline.is_closed);

        assert!(matches!(
            run(&bus, &mut scene, "polyline 0,0").unwrap_err(),
            EngineError::Cad(CadError::InvalidGeometry(_))
        ));
        assert_eq!(
            run(&bus, &mut scene, "polyline 0,0 1,x").unwrap_err(),
            EngineError::InvalidArgument {
                argument: "vertex".into(),
                value: "1,x".into()
            }
        );
        assert_eq!(scene.document().len(), 1);
    }

    #[test]
    fn undo_of_current_layer_keeps_drawing_possible() {
        let bus = CommandBus::new();
        let mut scene = Scene::new();
        run(&bus, &mut scene, "add_layer GEOM").unwrap();
        run(&bus, &mut scene, "set_layer GEOM").unwrap();
        run(&bus, &mut scene, "undo").unwrap();
        let id = run(&bus, &mut scene, "circle 0,0 1").unwrap().created[0];
        assert_eq!(scene.document().entity(id).unwrap().layer(), "0");
    }

    #[test]
    fn layer_commands_round_trip() {
        let bus = CommandBus::new();
        let mut scene = Scene::new();
        run(&bus, &mut scene, "add_layer GEOM color=#ff0000").unwrap();
        run(&bus, &mut scene, "set_layer GEOM").unwrap();
        let id = run(&bus, &mut scene, "circle 0,0 1").unwrap().created[0];
        assert_eq!(scene.document().entity(id).unwrap().layer(), "GEOM");

        run(&bus, &mut scene, "update_layer GEOM visible=false").unwrap();
        assert!(!scene.document().layer("GEOM").unwrap().is_visible);
        assert_eq!(
            run(&bus, &mut scene, "remove_layer GEOM").unwrap_err(),
            EngineError::LayerInUse("GEOM".into())
        );
        run(&bus, &mut scene, "set_layer 0").unwrap();
        assert_eq!(
            run(&bus, &mut scene, "remove_layer GEOM").unwrap_err(),
            EngineError::LayerInUse("GEOM".into())
        );
    }

    #[test]
    fn snap_and_pick_report_hits() {
        let bus = CommandBus::new();
        let mut scene = Scene::new();
        let first = run(&bus, &mut scene, "circle 0,0 5").unwrap().created[0];
        run(&bus, &mut scene, "circle 10,0 5").unwrap();

        let response = run(&bus, &mut scene, "snap 0.5,0.5").unwrap();
        assert!(response.message.starts_with("center"));

        run(&bus, &mut scene, "pick 0,5 tolerance=0.1").unwrap();
        assert!(scene.document().is_selected(first));
        let response = run(&bus, &mut scene, "pick 5,5 tolerance=0.1").unwrap();
        assert_eq!(response.message, "未命中实体");
    }

    #[test]
    fn lists_builtin_commands() {
        let bus = CommandBus::new();
        let names = bus.available_commands();
        for expected in ["circle", "tan_circle", "undo", "redo", "clear_undo", "snap"] {
            assert!(names.contains(&expected), "missing {expected}");
        }
        assert!(names.windows(2).all(|pair| pair[0] < pair[1]));
    }
}
