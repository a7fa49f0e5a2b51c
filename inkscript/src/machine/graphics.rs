//! Graphics state stack, path buffer and the CTM algebra.

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Rgb {
    pub r: f64,
    pub g: f64,
    pub b: f64,
}

impl Rgb {
    pub const BLACK: Self = Self {
        r: 0.,
        g: 0.,
        b: 0.,
    };

    pub fn new(r: f64, g: f64, b: f64) -> Self {
        Self { r, g, b }
    }

    /// Gray level expands to an RGB triple with equal components.
    pub fn gray(level: f64) -> Self {
        Self::new(level, level, level)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum PathSegment {
    MoveTo(Point),
    LineTo(Point),
    CurveTo(Point, Point, Point),
    ClosePath,
}

/// Affine transform `[[a b 0] [c d 0] [e f 1]]`, row vector convention:
/// `(x, y, 1) * M`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Matrix {
    pub a: f64,
    pub b: f64,
    pub c: f64,
    pub d: f64,
    pub e: f64,
    pub f: f64,
}

impl Matrix {
    pub const IDENTITY: Self = Self::new(1., 0., 0., 1., 0., 0.);

    pub const fn new(a: f64, b: f64, c: f64, d: f64, e: f64, f: f64) -> Self {
        Self { a, b, c, d, e, f }
    }

    pub fn translation(tx: f64, ty: f64) -> Self {
        Self::new(1., 0., 0., 1., tx, ty)
    }

    pub fn scaling(sx: f64, sy: f64) -> Self {
        Self::new(sx, 0., 0., sy, 0., 0.)
    }

    pub fn rotation(degrees: f64) -> Self {
        let (sin, cos) = degrees.to_radians().sin_cos();
        Self::new(cos, sin, -sin, cos, 0., 0.)
    }

    /// `self · rhs`. Transform operators update the CTM as
    /// `ctm = local.mul(ctm)`, local transform applies first.
    #[must_use]
    pub fn mul(self, rhs: Self) -> Self {
        Self::new(
            self.a * rhs.a + self.b * rhs.c,
            self.a * rhs.b + self.b * rhs.d,
            self.c * rhs.a + self.d * rhs.c,
            self.c * rhs.b + self.d * rhs.d,
            self.e * rhs.a + self.f * rhs.c + rhs.e,
            self.e * rhs.b + self.f * rhs.d + rhs.f,
        )
    }

    pub fn as_array(&self) -> [f64; 6] {
        [self.a, self.b, self.c, self.d, self.e, self.f]
    }
}

impl Default for Matrix {
    fn default() -> Self {
        Self::IDENTITY
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct GraphicsState {
    pub current_point: Point,
    pub path: Vec<PathSegment>,
    pub ctm: Matrix,
    pub line_width: f64,
    pub color: Rgb,
}

impl Default for GraphicsState {
    fn default() -> Self {
        Self {
            current_point: Point::default(),
            path: Vec::new(),
            ctm: Matrix::IDENTITY,
            line_width: 1.0,
            color: Rgb::BLACK,
        }
    }
}

impl GraphicsState {
    pub fn concat(&mut self, m: Matrix) {
        self.ctm = m.mul(self.ctm);
    }

    pub fn move_to(&mut self, p: Point) {
        self.current_point = p;
        self.path.push(PathSegment::MoveTo(p));
    }

    pub fn line_to(&mut self, p: Point) {
        self.current_point = p;
        self.path.push(PathSegment::LineTo(p));
    }

    pub fn curve_to(&mut self, p1: Point, p2: Point, p3: Point) {
        self.current_point = p3;
        self.path.push(PathSegment::CurveTo(p1, p2, p3));
    }

    pub fn close_path(&mut self) {
        self.path.push(PathSegment::ClosePath);
    }
}

/// Structured drawing events for a downstream device; stroke and fill
/// carry everything needed to reproduce the shape.
#[derive(Debug, Clone, PartialEq)]
pub enum PageEvent {
    Stroke {
        path: Vec<PathSegment>,
        ctm: Matrix,
        color: Rgb,
        line_width: f64,
    },
    Fill {
        path: Vec<PathSegment>,
        ctm: Matrix,
        color: Rgb,
    },
    /// Shown text bytes, no implied line ending.
    Text(Vec<u8>),
    EndPage,
}
