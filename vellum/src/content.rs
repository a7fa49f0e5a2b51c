//! Translates content stream operators into interpreter programs and
//! drives execution page by page.

use crate::{
    file::{Document, ObjectResolver, Page},
    object::{Dictionary, Object, ObjectValueError},
    parser::{offset_in, parse_object, whitespace_or_comment, ws_prefixed, ParseResult},
};
use anyhow::Result as AnyResult;
use educe::Educe;
use inkscript::{Machine, PageEvent, Value};
use log::{debug, error, warn};
use nom::{bytes::complete::is_not, combinator::map, Parser};
use std::path::Path;

/// Content stream operator token to interpreter operator name. Ops
/// needing operand surgery (`re`, `v`, `y`, text show variants) are
/// handled before this table applies.
static OPERATOR_MAP: phf::Map<&'static str, &'static str> = phf::phf_map! {
    "m" => "moveto",
    "l" => "lineto",
    "c" => "curveto",
    "h" => "closepath",
    "S" => "stroke",
    "f" => "fill",
    "F" => "fill",
    "f*" => "fill",
    "B" => "fillstroke",
    "B*" => "fillstroke",
    "n" => "newpath",
    "q" => "gsave",
    "Q" => "grestore",
    "cm" => "concat",
    "w" => "setlinewidth",
    "rg" => "setrgbcolor",
    "RG" => "setrgbcolor",
    "g" => "setgray",
    "G" => "setgray",
    "Tj" => "show",
    "'" => "show",
};

/// Operators consumed without effect: text state and positioning
/// (events are recorded for shown text only), clipping, device
/// parameters outside the supported set, and marked content.
const CONSUMED_OPS: &[&str] = &[
    "BT", "ET", "Td", "TD", "Tm", "T*", "Tc", "Tw", "Tz", "TL", "Tf", "Tr", "Ts", "d0", "d1",
    "W", "W*", "J", "j", "M", "d", "ri", "i", "gs", "sh", "CS", "cs", "SC", "SCN", "sc", "scn",
    "k", "K", "MP", "DP", "BMC", "BDC", "EMC", "BX", "EX",
];

#[derive(Debug, PartialEq)]
enum ObjectOrOperator<'a> {
    Object(Object),
    Operator(&'a str),
}

fn parse_operator(input: &[u8]) -> ParseResult<ObjectOrOperator> {
    let p = is_not(b" \t\n\r%[<(/".as_slice());
    map(p, |op| {
        // operator tokens are always ascii
        let op = unsafe { std::str::from_utf8_unchecked(op) };
        ObjectOrOperator::Operator(op)
    })(input)
}

fn parse_object_or_operator(input: &[u8]) -> ParseResult<ObjectOrOperator> {
    nom::branch::alt((parse_object.map(ObjectOrOperator::Object), parse_operator))(input)
}

fn script_err(e: impl std::fmt::Display) -> ObjectValueError {
    ObjectValueError::ContentExecution(e.to_string())
}

/// Pop the last `N` operands as numbers, in operand order.
fn take_numbers<const N: usize>(
    operands: &mut Vec<Object>,
) -> Result<[f64; N], ObjectValueError> {
    if operands.len() < N {
        return Err(ObjectValueError::OperationSchemaError);
    }
    let mut r = [0.0; N];
    for i in (0..N).rev() {
        r[i] = f64::from(
            operands
                .pop()
                .unwrap()
                .as_number()
                .map_err(|_| ObjectValueError::OperationSchemaError)?,
        );
    }
    Ok(r)
}

fn to_value(o: &Object) -> Result<Value, ObjectValueError> {
    Ok(match o {
        Object::Null => Value::Null,
        Object::Bool(b) => Value::Bool(*b),
        Object::Integer(i) => Value::Integer(i64::from(*i)),
        Object::Number(n) => Value::Real(f64::from(*n)),
        Object::LiteralString(s) => Value::from(s.as_bytes().to_vec()),
        Object::HexString(s) => Value::from(s.as_bytes().to_vec()),
        // interpreter-side literal names carry their leading slash
        Object::Name(n) => Value::Name(inkscript::name(&format!("/{}", n))),
        Object::Array(arr) => {
            let values: Result<Vec<_>, _> = arr.iter().map(to_value).collect();
            Value::from(values?)
        }
        Object::Dictionary(d) => {
            let entries: Result<inkscript::machine::Dictionary, ObjectValueError> = d
                .iter()
                .map(|(k, v)| to_value(v).map(|v| (k.clone(), v)))
                .collect();
            Value::from(entries?)
        }
        Object::Stream(_) | Object::Reference(_) => {
            return Err(ObjectValueError::OperationSchemaError)
        }
    })
}

/// Executes a page's content streams on one interpreter instance.
#[derive(Educe)]
#[educe(Debug)]
pub struct ContentExecutor<'a, 'b> {
    #[educe(Debug(ignore))]
    resolver: &'b ObjectResolver<'a>,
    #[educe(Debug(ignore))]
    resources: Option<&'b Dictionary>,
    machine: Machine,
    xobject_depth: usize,
}

impl<'a, 'b: 'a> ContentExecutor<'a, 'b> {
    pub fn new(resolver: &'b ObjectResolver<'a>, resources: Option<&'b Dictionary>) -> Self {
        Self {
            resolver,
            resources,
            machine: Machine::new(),
            xobject_depth: 0,
        }
    }

    pub fn machine(&self) -> &Machine {
        &self.machine
    }

    pub fn into_machine(self) -> Machine {
        self.machine
    }

    /// Tokenize and run one content stream buffer. Operands collect
    /// until an operator token spends them.
    pub fn execute_content(&mut self, buf: &[u8]) -> Result<(), ObjectValueError> {
        let mut input = buf;
        let mut operands: Vec<Object> = Vec::with_capacity(8);
        loop {
            match ws_prefixed(parse_object_or_operator)(input) {
                Err(nom::Err::Error(_)) => break,
                Err(e) => {
                    return Err(ObjectValueError::ParseError(
                        offset_in(buf, input),
                        format!("{:?}", e),
                    ))
                }
                Ok((remains, vr)) => {
                    input = remains;
                    match vr {
                        ObjectOrOperator::Object(o) => operands.push(o),
                        ObjectOrOperator::Operator(op) => {
                            let op = op.to_owned();
                            self.exec_operator(&op, &mut operands)?;
                            operands.clear();
                        }
                    }
                }
            }
        }
        let (rest, _) = whitespace_or_comment(input).unwrap_or((input, ()));
        if !rest.is_empty() {
            warn!(
                "content stream has unparsed bytes at {}: {:?}",
                offset_in(buf, rest),
                String::from_utf8_lossy(&rest[..rest.len().min(16)])
            );
        }
        Ok(())
    }

    fn exec_operator(
        &mut self,
        op: &str,
        operands: &mut Vec<Object>,
    ) -> Result<(), ObjectValueError> {
        match op {
            "TJ" => return self.show_text_array(operands),
            "\"" => {
                // aw ac string " : spacing operands are dropped
                let text = operands.pop().ok_or(ObjectValueError::OperationSchemaError)?;
                self.machine.push_value(to_value(&text)?);
                return self.run_machine_op("show");
            }
            "re" => return self.append_rectangle(operands),
            "v" => {
                // current point doubles as the first control point
                let [x2, y2, x3, y3] = take_numbers::<4>(operands)?;
                let cp = self.machine.graphics().current_point;
                for n in [cp.x, cp.y, x2, y2, x3, y3] {
                    self.machine.push_value(Value::Real(n));
                }
                return self.run_machine_op("curveto");
            }
            "y" => {
                // final point doubles as the second control point
                let [x1, y1, x3, y3] = take_numbers::<4>(operands)?;
                for n in [x1, y1, x3, y3, x3, y3] {
                    self.machine.push_value(Value::Real(n));
                }
                return self.run_machine_op("curveto");
            }
            "s" => {
                self.run_machine_op("closepath")?;
                return self.run_machine_op("stroke");
            }
            "b" | "b*" => {
                self.run_machine_op("closepath")?;
                return self.run_machine_op("fillstroke");
            }
            "Do" => {
                let name = operands
                    .pop()
                    .ok_or(ObjectValueError::OperationSchemaError)?;
                let name = name.as_name()?.clone();
                return self.paint_xobject(&name);
            }
            "BI" | "ID" | "EI" => {
                // inline image data is not tokenizable as objects
                return Err(ObjectValueError::OperationSchemaError);
            }
            _ => {}
        }

        if CONSUMED_OPS.contains(&op) {
            debug!("operator {} consumed without effect", op);
            return Ok(());
        }

        if let Some(pl_op) = OPERATOR_MAP.get(op) {
            for o in operands.drain(..) {
                self.machine.push_value(to_value(&o)?);
            }
            return self.run_machine_op(pl_op);
        }

        // unmapped tokens pass through as literals: operands reach the
        // stack, the token itself executes through the interpreter
        debug!("content operator {} not mapped, passed through", op);
        for o in operands.drain(..) {
            self.machine.push_value(to_value(&o)?);
        }
        self.run_machine_op(op)
    }

    fn run_machine_op(&mut self, op: &str) -> Result<(), ObjectValueError> {
        self.machine.exec_operator(op).map_err(script_err)
    }

    fn show_text_array(&mut self, operands: &mut Vec<Object>) -> Result<(), ObjectValueError> {
        let arr = operands
            .pop()
            .ok_or(ObjectValueError::OperationSchemaError)?;
        let arr = arr.as_arr()?;
        let mut text = Vec::new();
        for o in arr {
            match o {
                Object::LiteralString(s) => text.extend_from_slice(s.as_bytes()),
                Object::HexString(s) => text.extend_from_slice(s.as_bytes()),
                // kerning adjustments carry no text
                Object::Integer(_) | Object::Number(_) => {}
                _ => return Err(ObjectValueError::OperationSchemaError),
            }
        }
        self.machine.push_value(Value::from(text));
        self.run_machine_op("show")
    }

    /// `x y w h re`: rectangle expands to an explicit path.
    fn append_rectangle(&mut self, operands: &mut Vec<Object>) -> Result<(), ObjectValueError> {
        let [x, y, w, h] = take_numbers::<4>(operands)?;
        for (px, py, op) in [
            (x, y, "moveto"),
            (x + w, y, "lineto"),
            (x + w, y + h, "lineto"),
            (x, y + h, "lineto"),
        ] {
            self.machine.push_value(Value::Real(px));
            self.machine.push_value(Value::Real(py));
            self.run_machine_op(op)?;
        }
        self.run_machine_op("closepath")
    }

    /// `Do`: a Form XObject's content executes in place inside a saved
    /// graphics state; images are out of scope and skipped.
    fn paint_xobject(&mut self, name: &str) -> Result<(), ObjectValueError> {
        const MAX_XOBJECT_DEPTH: usize = 16;

        let Some(resources) = self.resources else {
            warn!("XObject {} without page resources, skipped", name);
            return Ok(());
        };
        let Some(xobjects) = self.resolver.opt_dict_value(resources, "XObject")? else {
            warn!("XObject {} not in resources, skipped", name);
            return Ok(());
        };
        let Some(xobject) = xobjects.as_dict()?.get(name) else {
            warn!("XObject {} not found, skipped", name);
            return Ok(());
        };
        let stream = self.resolver.resolve_reference(xobject)?.as_stream()?;
        let dict = stream.as_dict();
        match dict.get_name("Subtype")?.map(|n| n.as_str()) {
            Some("Form") => {
                if self.xobject_depth >= MAX_XOBJECT_DEPTH {
                    warn!("form XObject nesting too deep, {} skipped", name);
                    return Ok(());
                }
                let data = stream.decode(self.resolver.file_buf(), self.resolver)?;
                self.run_machine_op("gsave")?;
                if let Some(matrix) = self.resolver.opt_dict_value(dict, "Matrix")? {
                    let arr = matrix.as_arr()?;
                    if arr.len() == 6 {
                        for o in arr {
                            self.machine
                                .push_value(Value::Real(f64::from(o.as_number()?)));
                        }
                        self.run_machine_op("concat")?;
                    }
                }
                let saved_resources = self.resources;
                if let Some(Object::Dictionary(r)) =
                    self.resolver.opt_dict_value(dict, "Resources")?
                {
                    self.resources = Some(r);
                }
                self.xobject_depth += 1;
                let result = self.execute_content(&data);
                self.xobject_depth -= 1;
                self.resources = saved_resources;
                self.run_machine_op("grestore")?;
                result
            }
            Some("Image") => {
                debug!("image XObject {} skipped", name);
                Ok(())
            }
            other => {
                warn!("XObject {} with subtype {:?} skipped", name, other);
                Ok(())
            }
        }
    }
}

/// Events produced by one page.
#[derive(Debug)]
pub struct PageOutput {
    pub page_no: usize,
    pub events: Vec<PageEvent>,
}

/// Parse the document at `path`, walk the page tree and execute every
/// page's content. A failing page is logged and skipped so the rest of
/// the document still processes.
pub fn process_file(path: impl AsRef<Path>) -> AnyResult<Vec<PageOutput>> {
    let doc = Document::open(path)?;
    process_document(&doc)
}

pub fn process_document(doc: &Document) -> AnyResult<Vec<PageOutput>> {
    let resolver = doc.resolver();
    let catalog = doc.catalog(&resolver)?;
    let pages = catalog.pages()?;
    let mut outputs = Vec::with_capacity(pages.len());
    for (i, page) in pages.iter().enumerate() {
        let page_no = i + 1;
        match process_page(&resolver, page) {
            Ok(events) => outputs.push(PageOutput { page_no, events }),
            Err(e) => error!("page {} failed: {}, skipped", page_no, e),
        }
    }
    Ok(outputs)
}

fn process_page<'a, 'b: 'a>(
    resolver: &'b ObjectResolver<'a>,
    page: &Page<'a, 'b>,
) -> Result<Vec<PageEvent>, ObjectValueError> {
    let content = page.content()?;
    let resources = page.resources()?;
    let mut executor = ContentExecutor::new(resolver, resources);
    for buf in content.iter() {
        // an error unwinds to here; later streams still run
        if let Err(e) = executor.execute_content(buf) {
            error!("content stream aborted: {}", e);
        }
    }
    let mut machine = executor.into_machine();
    machine.exec_operator("showpage").map_err(script_err)?;
    Ok(machine.take_events())
}
