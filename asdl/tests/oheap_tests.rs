//! Encoding values with the command line tool and decoding them again.

use std::path::Path;
use std::process::{Command, Output};

fn asdl(args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_asdl"))
        .current_dir("..")
        .args(args)
        .output()
        .unwrap()
}

fn path_str(path: &Path) -> &str {
    path.to_str().unwrap()
}

fn round_trip(value: &str, params: &[&str]) -> String {
    let dir = tempfile::tempdir().unwrap();
    let value_path = dir.path().join("value.txt");
    let blob_path = dir.path().join("value.oheap");
    std::fs::write(&value_path, value).unwrap();

    let mut encode = vec!["encode", "schemas/arith.asdl", "--type", "arith_expr"];
    encode.extend([path_str(&value_path), "-o", path_str(&blob_path)]);
    encode.extend(params);
    let output = asdl(&encode);
    assert_eq!(output.status.code(), Some(0), "{}", String::from_utf8_lossy(&output.stderr));

    let blob = std::fs::read(&blob_path).unwrap();
    assert_eq!(&blob[..4], b"OHP\x01");

    let mut decode = vec!["decode", "schemas/arith.asdl", "--type", "arith_expr"];
    decode.push(path_str(&blob_path));
    decode.extend(params);
    let output = asdl(&decode);
    assert_eq!(output.status.code(), Some(0), "{}", String::from_utf8_lossy(&output.stderr));

    String::from_utf8(output.stdout).unwrap()
}

#[test]
fn nested_expression() {
    let decoded = round_trip(r#"Binary(Plus, Const(1), Unary(Minus, Var("x")))"#, &[]);

    assert_eq!(
        decoded,
        "Binary(op = Plus, left = Const(i = 1), \
         right = Unary(op = Minus, child = Var(name = \"x\")))\n",
    );
}

#[test]
fn arrays_and_optional_records() {
    let value = r#"
        -- f(a[1:], 2)
        FuncCall(
            name = "f",
            args = [Slice(a = Var("a"), begin = Const(1)), Const(2, loc = pos(3, 4))],
        )
    "#;
    let decoded = round_trip(value, &["--int-width", "4", "--ref-width", "4", "--alignment", "8"]);

    assert_eq!(
        decoded,
        "FuncCall(name = \"f\", args = [Slice(a = Var(name = \"a\"), begin = Const(i = 1)), \
         Const(i = 2, loc = pos(line = 3, col = 4))])\n",
    );
}

#[test]
fn overflow_names_the_innermost_record() {
    let dir = tempfile::tempdir().unwrap();
    let value_path = dir.path().join("value.txt");
    let blob_path = dir.path().join("value.oheap");
    std::fs::write(&value_path, "Unary(Minus, Const(70000))").unwrap();

    let output = asdl(&[
        "encode",
        "schemas/arith.asdl",
        "--type",
        "arith_expr",
        path_str(&value_path),
        "-o",
        path_str(&blob_path),
        "--int-width",
        "2",
    ]);

    assert_eq!(output.status.code(), Some(1));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(
        stderr.contains("70000 is too big to fit in 2 bytes (in field `i` of `Const`)"),
        "{stderr}",
    );
    assert!(!blob_path.exists());
}

#[test]
fn truncated_blob() {
    let dir = tempfile::tempdir().unwrap();
    let blob_path = dir.path().join("value.oheap");
    std::fs::write(&blob_path, b"OHP\x01\x04").unwrap();

    let blob = path_str(&blob_path);
    let output = asdl(&["decode", "schemas/arith.asdl", "--type", "arith_expr", blob]);

    assert_eq!(output.status.code(), Some(1));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("failed to decode value of type `arith_expr`"), "{stderr}");
}
