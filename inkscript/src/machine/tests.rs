use super::{graphics::PathSegment, *};
use test_case::test_case;
use test_log::test;

trait Assert {
    fn assert(&self, m: &Machine);
}

impl<V: Into<RuntimeValue> + Clone> Assert for V {
    fn assert(&self, m: &Machine) {
        assert_eq!(m.stack.len(), 1);
        assert_eq!(m.stack[0], self.clone().into());
    }
}

struct Stack(Vec<RuntimeValue>);

impl Assert for Stack {
    fn assert(&self, m: &Machine) {
        assert_eq!(m.stack, self.0);
    }
}

fn exec(s: &str) -> Machine {
    let mut machine = Machine::new();
    machine.execute(s.as_bytes()).unwrap();
    machine
}

fn assert_op(s: &str, exp_result: impl Assert) {
    exp_result.assert(&exec(s));
}

fn assert_err(s: &str, exp: MachineError) {
    let mut machine = Machine::new();
    let err = machine.execute(s.as_bytes()).unwrap_err();
    assert_eq!(err.source, exp);
}

#[test]
fn test_dup() {
    assert_op("2 dup", Stack(rt_values![2i64, 2i64]));
}

#[test]
fn test_exch() {
    assert_op("1 2 exch", Stack(rt_values![2i64, 1i64]));
}

#[test]
fn exch_self_inverse() {
    assert_op("1 2 exch exch", Stack(rt_values![1i64, 2i64]));
}

#[test]
fn dup_pop_identity() {
    assert_op("7 dup pop", 7i64);
}

#[test]
fn test_pop_clear() {
    assert_op("1 2 pop", 1i64);
    assert_op("1 2 3 clear", Stack(rt_values![]));
}

#[test]
fn copy() {
    assert_op(
        "1 2 3 4 5 3 copy",
        Stack(rt_values![1i64, 2i64, 3i64, 4i64, 5i64, 3i64, 4i64, 5i64]),
    );
}

#[test]
fn count() {
    assert_op("10 2 count", Stack(rt_values![10i64, 2i64, 2i64]));
}

#[test]
fn index() {
    assert_op("10 20 30 2 index", Stack(rt_values![10i64, 20i64, 30i64, 10i64]));
}

#[test_case("5 3 add", 8i64; "int add")]
#[test_case("5 3.5 add", 8.5; "mixed add promotes")]
#[test_case("5 3 sub", 2i64; "sub")]
#[test_case("4 2.5 mul", 10.0; "mul real")]
#[test_case("6 2 div", 3i64; "exact div stays integer")]
#[test_case("5 2 div", 2.5; "inexact div promotes")]
#[test_case("7.0 2 div", 3.5; "real div")]
fn arithmetic(s: &str, exp: impl Into<RuntimeValue> + Clone) {
    assert_op(s, exp);
}

#[test]
fn div_by_zero() {
    assert_err("1 0 div", MachineError::DivisionByZero);
    assert_err("1.5 0.0 div", MachineError::DivisionByZero);
}

#[test]
fn underflow() {
    assert_err("add", MachineError::StackUnderflow);
    assert_err("1 exch", MachineError::StackUnderflow);
}

#[test_case("1 2 eq", false)]
#[test_case("2 2 eq", true)]
#[test_case("2 2.0 eq", true; "int real promote")]
#[test_case("(abc) (abc) eq", true; "string content")]
#[test_case("(a) 1 eq", false; "mixed types unequal")]
#[test_case("(foo) /foo eq", false; "string never equals name")]
#[test_case("/foo (foo) ne", true; "name never equals string")]
#[test_case("1 2 ne", true)]
#[test_case("1 2 lt", true)]
#[test_case("2 2 le", true)]
#[test_case("3 2 gt", true)]
#[test_case("2 3 ge", false)]
#[test_case("(abc) (abd) lt", true; "string order")]
fn comparison(s: &str, exp: bool) {
    assert_op(s, exp);
}

#[test]
fn composite_eq_is_identity() {
    // two literals with equal contents are still different objects
    assert_op("[ 1 ] [ 1 ] eq", false);
    assert_op("[ 1 ] dup eq", true);
}

#[test]
fn and() {
    assert_op("true true and", true);
    assert_op("true false and", false);
    assert_op("99 1 and", 1i64);
    assert_op("52 7 and", 4i64);
}

#[test]
fn or() {
    assert_op("true false or", true);
    assert_op("17 5 or", 21i64);
}

#[test]
fn not_xor() {
    assert_op("true not", false);
    assert_op("true false xor", true);
    assert_op("7 3 xor", 4i64);
}

#[test]
fn array_literal() {
    let m = exec("[ 1 2 3 ]");
    let arr = match &m.stack[0] {
        RuntimeValue::Value(Value::Array(a)) => a.borrow().clone(),
        v => panic!("not an array: {:?}", v),
    };
    assert_eq!(arr, values![1i64, 2i64, 3i64]);
}

#[test]
fn array_literal_element_values() {
    let m = exec("[ 1 2 add (s) /n ]");
    let arr = match &m.stack[0] {
        RuntimeValue::Value(Value::Array(a)) => a.borrow().clone(),
        v => panic!("not an array: {:?}", v),
    };
    assert_eq!(arr, values![3i64, *b"s", "/n"]);
}

#[test]
fn array_alloc() {
    let m = exec("2 array");
    let arr = match &m.stack[0] {
        RuntimeValue::Value(Value::Array(a)) => a.borrow().clone(),
        v => panic!("not an array: {:?}", v),
    };
    assert_eq!(arr, values![Value::Null, Value::Null]);
}

#[test]
fn array_get_put() {
    assert_op("[ 1 2 3 ] 1 get", 2i64);
    // put mutates through the alias still on the stack
    assert_op("[ 1 2 3 ] dup 0 9 put 0 get", 9i64);
}

#[test]
fn array_out_of_range() {
    assert_err("[ 1 ] 5 get", MachineError::RangeCheck);
    assert_err("[ 1 ] 5 9 put", MachineError::RangeCheck);
}

#[test]
fn test_length() {
    assert_op("[ 1 2 3 ] length", 3i64);
    assert_op("(abcd) length", 4i64);
    assert_op("3 dict length", 0i64);
}

#[test]
fn aload() {
    let m = exec("[ 1 2 3 ] aload pop");
    assert_eq!(m.stack, rt_values![1i64, 2i64, 3i64]);
}

#[test]
fn astore() {
    assert_op("1 2 3 3 array astore aload pop", Stack(rt_values![1i64, 2i64, 3i64]));
}

#[test]
fn forall() {
    assert_op("0 [ 1 2 3 ] { add } forall", 6i64);
}

#[test]
fn string_alloc() {
    assert_op("2 string", Stack(rt_values![[0u8, 0u8]]));
}

#[test]
fn string_get_put() {
    assert_op("(abc) 1 get", 98i64);
    assert_op("(abc) dup 0 88 put 0 get", 88i64);
}

#[test]
fn literal_name_keeps_slash() {
    // the pushed value carries the slash; only key use strips it
    assert_op("/foo", Value::from("/foo"));
}

#[test]
fn test_def_load() {
    assert_op("/x 42 def /x load", 42i64);
    assert_op("/x 1 def /x 2 def /x load", 2i64);
}

#[test]
fn load_undefined() {
    assert_err("/nope load", MachineError::Undefined);
}

#[test]
fn test_store_known() {
    assert_op("1 dict dup /k 9 store /k known", true);
    assert_op("1 dict /k known", false);
}

#[test]
fn test_keys() {
    // keys restores the leading slash stripped at definition time
    assert_op("1 dict dup /k 9 store keys 0 get", Value::from("/k"));
}

#[test]
fn dict_literal() {
    assert_op("<< /a 1 >> begin /a load", 1i64);
}

#[test]
fn dict_store_then_load() {
    assert_op("1 dict dup /k 3 store begin /k load", 3i64);
}

#[test]
fn begin_end() {
    assert_op("1 dict begin /v 5 def /v load end", 5i64);
    assert_err("end", MachineError::DictStackUnderflow);
}

#[test]
fn currentdict() {
    let m = exec("currentdict");
    assert!(matches!(
        m.stack[0],
        RuntimeValue::Value(Value::Dictionary(_))
    ));
}

#[test]
fn procedure_def_call() {
    assert_op("/sq { dup mul } def 4 sq", 16i64);
}

#[test]
fn procedure_recursion_via_name() {
    // procedures capture no dictionary, lookup happens at run time
    assert_op("/inc { 1 add } def /twice { inc inc } def 1 twice", 3i64);
}

#[test]
fn test_if() {
    assert_op("true { 1 } if", 1i64);
    assert_op("false { 1 } if", Stack(rt_values![]));
    assert_op("1 { 2 } if", 2i64);
}

#[test]
fn test_ifelse() {
    assert_op("true { 1 } { 2 } ifelse", 1i64);
    assert_op("false { 1 } { 2 } ifelse", 2i64);
}

#[test]
fn test_repeat() {
    assert_op("0 3 { 1 add } repeat", 3i64);
}

#[test]
fn test_for() {
    assert_op("1 1 1 3 { } for", Stack(rt_values![1i64, 1i64, 2i64, 3i64]));
    assert_op("0 10 -2 0 { add } for", 30i64);
}

#[test]
fn for_zero_increment() {
    assert_err("1 0 3 { } for", MachineError::RangeCheck);
}

#[test]
fn test_exec() {
    assert_op("{ 1 2 add } exec", 3i64);
}

#[test]
fn show_emits_text() {
    let mut m = exec("(Hello) show");
    assert!(m.stack.is_empty());
    assert_eq!(m.take_events(), vec![PageEvent::Text(b"Hello".to_vec())]);
}

#[test]
fn unknown_token_pushes_string() {
    assert_op("frobnicate", Stack(rt_values![*b"frobnicate"]));
}

#[test]
fn execute_token_single() {
    let mut m = Machine::new();
    m.execute_token("5").unwrap();
    m.execute_token("3").unwrap();
    m.execute_token("add").unwrap();
    assert_eq!(m.stack, rt_values![8i64]);
}

#[test]
fn script_error_reports_token_and_depth() {
    let mut m = Machine::new();
    let err = m.execute(b"1 add").unwrap_err();
    assert_eq!(err.token, "add");
    assert_eq!(err.source, MachineError::StackUnderflow);
}

mod graphics_ops {
    use super::*;

    #[test]
    fn moveto_lineto_stroke() {
        let mut m = exec("100 100 moveto 200 100 lineto 200 200 lineto closepath stroke");
        let events = m.take_events();
        assert_eq!(events.len(), 1);
        let PageEvent::Stroke {
            path,
            ctm,
            color,
            line_width,
        } = &events[0]
        else {
            panic!("expected stroke: {:?}", events[0]);
        };
        assert_eq!(
            path,
            &vec![
                PathSegment::MoveTo(Point::new(100., 100.)),
                PathSegment::LineTo(Point::new(200., 100.)),
                PathSegment::LineTo(Point::new(200., 200.)),
                PathSegment::ClosePath,
            ]
        );
        assert_eq!(ctm, &Matrix::IDENTITY);
        assert_eq!(color, &Rgb::BLACK);
        assert_eq!(line_width, &1.0);
        // path cleared after paint
        assert!(m.graphics().path.is_empty());
    }

    #[test]
    fn fill_uses_current_color() {
        let mut m = exec("1 0 0 setrgbcolor 0 0 moveto 10 0 lineto fill");
        let events = m.take_events();
        let PageEvent::Fill { color, .. } = &events[0] else {
            panic!("expected fill");
        };
        assert_eq!(color, &Rgb::new(1., 0., 0.));
    }

    #[test]
    fn fillstroke_paints_same_path_twice() {
        let mut m = exec("0 0 moveto 5 5 lineto fillstroke");
        let events = m.take_events();
        assert_eq!(events.len(), 2);
        let (PageEvent::Fill { path: f, .. }, PageEvent::Stroke { path: s, .. }) =
            (&events[0], &events[1])
        else {
            panic!("expected fill then stroke");
        };
        assert_eq!(f, s);
        assert!(m.graphics().path.is_empty());
    }

    #[test]
    fn newpath_clears() {
        let m = exec("0 0 moveto 5 5 lineto newpath");
        assert!(m.graphics().path.is_empty());
    }

    #[test]
    fn curveto_appends_segment_and_current_point() {
        let m = exec("0 0 moveto 1 2 3 4 5 6 curveto");
        assert_eq!(
            m.graphics().path[1],
            PathSegment::CurveTo(
                Point::new(1., 2.),
                Point::new(3., 4.),
                Point::new(5., 6.)
            )
        );
        assert_eq!(m.graphics().current_point, Point::new(5., 6.));
    }

    #[test]
    fn gsave_grestore_balanced_restores_state() {
        let before = Machine::new().graphics().clone();
        let m = exec("gsave 3 setlinewidth 0.5 setgray 10 20 translate grestore");
        assert_eq!(m.graphics(), &before);
    }

    #[test]
    fn grestore_floor() {
        assert_err("grestore", MachineError::GraphicsStackUnderflow);
        assert_err("gsave grestore grestore", MachineError::GraphicsStackUnderflow);
    }

    #[test]
    fn translate_updates_ctm() {
        let m = exec("10 20 translate");
        assert_eq!(m.graphics().ctm, Matrix::new(1., 0., 0., 1., 10., 20.));
    }

    #[test]
    fn scale_then_translate_composes() {
        // translate happens in the scaled system
        let m = exec("2 2 scale 5 0 translate");
        assert_eq!(m.graphics().ctm, Matrix::new(2., 0., 0., 2., 10., 0.));
    }

    #[test]
    fn identity_transforms_leave_ctm() {
        for s in ["0 0 translate", "1 1 scale", "0 rotate"] {
            let m = exec(s);
            assert_eq!(m.graphics().ctm, Matrix::IDENTITY, "{}", s);
        }
    }

    #[test]
    fn concat_multiplies() {
        let m = exec("2 0 0 2 0 0 concat 1 0 0 1 3 4 concat");
        assert_eq!(m.graphics().ctm, Matrix::new(2., 0., 0., 2., 6., 8.));
    }

    #[test]
    fn setlinewidth_setcolor() {
        let m = exec("2.5 setlinewidth 0.2 0.4 0.6 setrgbcolor");
        assert_eq!(m.graphics().line_width, 2.5);
        assert_eq!(m.graphics().color, Rgb::new(0.2, 0.4, 0.6));
    }

    #[test]
    fn setgray() {
        let m = exec("0.5 setgray");
        assert_eq!(m.graphics().color, Rgb::gray(0.5));
    }

    #[test]
    fn showpage_event() {
        let mut m = exec("showpage");
        assert_eq!(m.take_events(), vec![PageEvent::EndPage]);
    }
}
