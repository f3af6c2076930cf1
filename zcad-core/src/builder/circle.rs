use super::{BuilderBase, EntityBuilder, required, wrong_kind};
use crate::entity::{Circle, Entity, Shape};
use crate::errors::CadError;
use crate::geometry::Coordinate;
use crate::math::quadratic_solver;

/// 消元时主元小于该值视为退化，改用下一种圆的排列。
const PIVOT_TOLERANCE: f64 = 1e-9;

/// 依次尝试的圆排列：原顺序、两种轮换，然后是其余排列。
const ORDERINGS: [[usize; 3]; 6] = [
    [0, 1, 2],
    [1, 2, 0],
    [2, 0, 1],
    [0, 2, 1],
    [2, 1, 0],
    [1, 0, 2],
];

/// 三切圆构造中每个给定圆的相切方式。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tangency {
    /// 给定圆位于解圆内部（符号 +1，圆心距 = r − rᵢ）。
    Internal,
    /// 给定圆位于解圆外部（符号 −1，圆心距 = r + rᵢ）。
    External,
}

impl Tangency {
    #[inline]
    pub fn sign(self) -> f64 {
        match self {
            Tangency::Internal => 1.0,
            Tangency::External => -1.0,
        }
    }

    /// 由 ±1 还原，其他取值返回 `None`。
    pub fn from_sign(sign: i32) -> Option<Self> {
        match sign {
            1 => Some(Tangency::Internal),
            -1 => Some(Tangency::External),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct CircleBuilder {
    base: BuilderBase,
    center: Option<Coordinate>,
    radius: Option<f64>,
}

impl CircleBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_entity(entity: &Entity) -> Result<Self, CadError> {
        match entity.shape() {
            Shape::Circle(circle) => Ok(Self {
                base: BuilderBase::from_entity(entity),
                center: Some(circle.center),
                radius: Some(circle.radius),
            }),
            _ => Err(wrong_kind("circle", entity)),
        }
    }

    pub fn set_center(mut self, center: Coordinate) -> Self {
        self.center = Some(center);
        self
    }

    pub fn set_radius(mut self, radius: f64) -> Self {
        self.radius = Some(radius);
        self
    }

    #[inline]
    pub fn center(&self) -> Option<Coordinate> {
        self.center
    }

    #[inline]
    pub fn radius(&self) -> Option<f64> {
        self.radius
    }

    /// 阿波罗尼奥斯问题：求与三个给定圆同时相切的圆。
    ///
    /// 由两两圆心距约束得到两条关于 (x, y, r) 的线性方程，消元后得到
    /// 关于 r 的一元二次方程，取最大正根并由线性关系回代圆心。
    /// 成功时设置圆心与半径；任一输入不是圆返回 `InvalidEntityKind`，
    /// 共线/同心等退化配置或无正根返回 `InvalidGeometry`，失败时构建器不变。
    pub fn three_tan_constructor(
        &mut self,
        circles: [&Entity; 3],
        tangency: [Tangency; 3],
    ) -> Result<(), CadError> {
        let mut given = [(Coordinate::ORIGIN, 0.0, 0.0); 3];
        for (slot, (entity, kind)) in given.iter_mut().zip(circles.iter().zip(tangency)) {
            let circle = entity
                .as_circle()
                .ok_or_else(|| wrong_kind("circle", entity))?;
            *slot = (circle.center, circle.radius, kind.sign());
        }

        for order in ORDERINGS {
            if let Some(outcome) = solve_ordered(order.map(|index| given[index])) {
                let (center, radius) = outcome?;
                self.center = Some(center);
                self.radius = Some(radius);
                return Ok(());
            }
        }
        Err(CadError::geometry(
            "tangent circle is undefined for collinear or concentric circles",
        ))
    }
}

/// 按给定顺序消元。主元退化时返回 `None`，由调用方换一种排列重试。
fn solve_ordered(circles: [(Coordinate, f64, f64); 3]) -> Option<Result<(Coordinate, f64), CadError>> {
    let [(c1, r1, s1), (c2, r2, s2), (c3, r3, s3)] = circles;
    let (x1, y1) = (c1.x(), c1.y());
    let (x2, y2) = (c2.x(), c2.y());
    let (x3, y3) = (c3.x(), c3.y());

    let v11 = 2.0 * x2 - 2.0 * x1;
    let v12 = 2.0 * y2 - 2.0 * y1;
    let v13 = x1 * x1 - x2 * x2 + y1 * y1 - y2 * y2 - r1 * r1 + r2 * r2;
    let v14 = 2.0 * s2 * r2 - 2.0 * s1 * r1;

    let v21 = 2.0 * x3 - 2.0 * x2;
    let v22 = 2.0 * y3 - 2.0 * y2;
    let v23 = x2 * x2 - x3 * x3 + y2 * y2 - y3 * y3 - r2 * r2 + r3 * r3;
    let v24 = 2.0 * s3 * r3 - 2.0 * s2 * r2;

    if v11.abs() < PIVOT_TOLERANCE || v21.abs() < PIVOT_TOLERANCE {
        return None;
    }

    let w12 = v12 / v11;
    let w13 = v13 / v11;
    let w14 = v14 / v11;

    let w22 = v22 / v21 - w12;
    let w23 = v23 / v21 - w13;
    let w24 = v24 / v21 - w14;

    if w22.abs() < PIVOT_TOLERANCE {
        return None;
    }

    // x = M + N·r, y = P + Q·r
    let p = -w23 / w22;
    let q = w24 / w22;
    let m = -w12 * p - w13;
    let n = w14 - w12 * q;

    let a = n * n + q * q - 1.0;
    let b = 2.0 * m * n - 2.0 * n * x1 + 2.0 * p * q - 2.0 * q * y1 + 2.0 * s1 * r1;
    let c = x1 * x1 + m * m - 2.0 * m * x1 + p * p + y1 * y1 - 2.0 * p * y1 - r1 * r1;

    let radius = if a.abs() < PIVOT_TOLERANCE {
        if b.abs() < PIVOT_TOLERANCE {
            return Some(Err(CadError::geometry("tangent circle equation is degenerate")));
        }
        Some(-c / b).filter(|r| *r > 0.0)
    } else {
        quadratic_solver([b / a, c / a])
            .into_iter()
            .filter(|r| *r > 0.0)
            .reduce(f64::max)
    };

    let Some(radius) = radius else {
        return Some(Err(CadError::geometry("no tangent circle with a positive radius")));
    };
    let center = Coordinate::new(m + n * radius, p + q * radius);
    if !center.is_finite() || !radius.is_finite() {
        return Some(Err(CadError::geometry("tangent circle solution is not finite")));
    }
    Some(Ok((center, radius)))
}

impl EntityBuilder for CircleBuilder {
    fn base(&self) -> &BuilderBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut BuilderBase {
        &mut self.base
    }

    fn build(&self) -> Result<Entity, CadError> {
        let center = required(self.center, "center")?;
        let radius = required(self.radius, "radius")?;
        self.base.finish(Shape::Circle(Circle { center, radius }))
    }
}
