use clap::{Args, Parser};
use std::path::PathBuf;

/// A compiler for Abstract Syntax Description Language schemas
#[derive(Parser)]
#[clap(author, version, about)]
struct Cli {
    #[clap(subcommand)]
    action: Action,
    /// Log the progress of each compiler stage to stderr
    #[clap(long = "verbose", global = true)]
    verbose: bool,
}

#[derive(clap::Subcommand)]
enum Action {
    /// Parse, validate and resolve a schema
    Check {
        #[clap(flatten)]
        schema: SchemaArgs,
    },
    /// Print a schema in canonical form
    Format {
        /// Path to the schema
        #[clap(name = "SCHEMA")]
        schema_file: PathOrStdin,
    },
    /// Generate Python classes, printing them to stdout
    Python {
        #[clap(flatten)]
        schema: SchemaArgs,
    },
    /// Generate a C++ header and source file
    #[clap(after_help = CPP_COMMAND_AFTER_HELP)]
    Cpp {
        #[clap(flatten)]
        schema: SchemaArgs,
        /// Path of the generated files, without the `.h` and `.cc` extensions
        #[clap(name = "OUT_PREFIX")]
        out_prefix: PathBuf,
    },
    /// Generate C preprocessor constants for enum tags, printing them to stdout
    C {
        #[clap(flatten)]
        schema: SchemaArgs,
    },
    /// Encode a value written in instance notation as an OHeap blob
    #[clap(after_help = ENCODE_COMMAND_AFTER_HELP)]
    Encode {
        #[clap(flatten)]
        schema: SchemaArgs,
        /// Type of the root value
        #[clap(long = "type", name = "TYPE")]
        type_name: String,
        /// Path to the value to encode
        #[clap(name = "VALUE_FILE")]
        value_file: PathOrStdin,
        /// Path to write the blob to
        #[clap(short = 'o', long = "output", name = "OUT")]
        out_file: PathBuf,
        #[clap(flatten)]
        params: BinaryArgs,
    },
    /// Decode an OHeap blob, printing the value in instance notation
    Decode {
        #[clap(flatten)]
        schema: SchemaArgs,
        /// Type of the root value
        #[clap(long = "type", name = "TYPE")]
        type_name: String,
        /// Path to the blob to decode
        #[clap(name = "BLOB")]
        blob_file: PathOrStdin,
        #[clap(flatten)]
        params: BinaryArgs,
    },
}

#[derive(Args)]
struct SchemaArgs {
    /// Path to the schema
    #[clap(name = "SCHEMA")]
    schema_file: PathOrStdin,
    /// A type supplied by the application, usable without a `use` declaration
    #[clap(long = "app-type", name = "NAME")]
    app_types: Vec<String>,
}

/// Layout of OHeap blobs. The same options must be used to decode a blob as
/// were used to encode it.
#[derive(Args)]
struct BinaryArgs {
    /// Alignment of blocks, in bytes
    #[clap(long = "alignment", default_value_t = 4)]
    alignment: usize,
    /// Width of constructor tags, in bytes
    #[clap(long = "tag-width", default_value_t = 1)]
    tag_width: usize,
    /// Width of references to blocks, in bytes
    #[clap(long = "ref-width", default_value_t = 3)]
    ref_width: usize,
    /// Width of integers, in bytes
    #[clap(long = "int-width", default_value_t = 3)]
    int_width: usize,
    /// Width of array lengths, in bytes
    #[clap(long = "index-width", default_value_t = 2)]
    index_width: usize,
}

const CPP_COMMAND_AFTER_HELP: &str = "\
Examples:

  $ asdl cpp schemas/arith.asdl out/arith_asdl
";

const ENCODE_COMMAND_AFTER_HELP: &str = "\
Examples:

  $ asdl encode schemas/arith.asdl --type arith_expr value.txt -o value.oheap
  $ asdl decode schemas/arith.asdl --type arith_expr value.oheap
";

#[derive(Clone, Debug)]
enum PathOrStdin {
    StdIn,
    Path(PathBuf),
}

impl std::str::FromStr for PathOrStdin {
    type Err = std::convert::Infallible;

    fn from_str(src: &str) -> Result<PathOrStdin, std::convert::Infallible> {
        match src {
            "-" => Ok(PathOrStdin::StdIn),
            _ => Ok(PathOrStdin::Path(PathBuf::from(src))),
        }
    }
}

fn unwrap_or_exit<T>(option: Option<T>) -> T {
    option.unwrap_or_else(|| std::process::exit(asdl::Status::Error.exit_code()))
}

fn load_file_or_exit(driver: &mut asdl::Driver, file: PathOrStdin) -> asdl::FileId {
    unwrap_or_exit(match file {
        PathOrStdin::StdIn => driver.load_source("<stdin>".to_owned(), std::io::stdin()),
        PathOrStdin::Path(path) => driver.load_source_path(&path),
    })
}

fn read_bytes_or_exit(driver: &mut asdl::Driver, file: PathOrStdin) -> Vec<u8> {
    unwrap_or_exit(match file {
        PathOrStdin::StdIn => driver.read_bytes("<stdin>".to_owned(), std::io::stdin()),
        PathOrStdin::Path(path) => driver.read_bytes_path(&path),
    })
}

fn binary_params_or_exit(args: BinaryArgs) -> asdl::core::binary::Params {
    let params = asdl::core::binary::Params::new(
        args.alignment,
        args.tag_width,
        args.ref_width,
        args.int_width,
        args.index_width,
    );
    params.unwrap_or_else(|error| {
        eprintln!("error: {error}");
        std::process::exit(asdl::Status::Error.exit_code())
    })
}

const MAX_PRETTY_WIDTH: usize = 80;

fn get_pretty_width() -> usize {
    let term_width = termsize::get().map_or(usize::MAX, |size| usize::from(size.cols));
    std::cmp::min(term_width, MAX_PRETTY_WIDTH)
}

fn init_logging(verbose: bool) {
    use tracing_subscriber::EnvFilter;

    let filter = match verbose {
        true => EnvFilter::new("debug"),
        false => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .without_time()
        .init();
}

/// A driver for an action on a schema.
fn schema_driver(schema: SchemaArgs) -> (asdl::Driver, asdl::FileId) {
    let mut driver = asdl::Driver::new();
    driver.install_panic_hook();
    driver.set_app_types(schema.app_types);

    let file_id = load_file_or_exit(&mut driver, schema.schema_file);
    (driver, file_id)
}

fn main() -> ! {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let status = match cli.action {
        Action::Check { schema } => {
            let (mut driver, file_id) = schema_driver(schema);
            driver.check_module(file_id)
        }
        Action::Format { schema_file } => {
            let mut driver = asdl::Driver::new();
            driver.install_panic_hook();
            driver.set_emit_width(get_pretty_width());

            let file_id = load_file_or_exit(&mut driver, schema_file);
            driver.format_module(file_id)
        }
        Action::Python { schema } => {
            let (mut driver, file_id) = schema_driver(schema);
            driver.emit_python(file_id)
        }
        Action::Cpp { schema, out_prefix } => {
            let (mut driver, file_id) = schema_driver(schema);
            driver.write_cpp(file_id, &out_prefix)
        }
        Action::C { schema } => {
            let (mut driver, file_id) = schema_driver(schema);
            driver.emit_c(file_id)
        }
        Action::Encode {
            schema,
            type_name,
            value_file,
            out_file,
            params,
        } => {
            let params = binary_params_or_exit(params);
            let (mut driver, schema_file_id) = schema_driver(schema);
            driver.set_binary_params(params);

            let value_file_id = load_file_or_exit(&mut driver, value_file);
            driver.encode_value(schema_file_id, &type_name, value_file_id, &out_file)
        }
        Action::Decode {
            schema,
            type_name,
            blob_file,
            params,
        } => {
            let params = binary_params_or_exit(params);
            let (mut driver, schema_file_id) = schema_driver(schema);
            driver.set_binary_params(params);

            let blob = read_bytes_or_exit(&mut driver, blob_file);
            driver.decode_value(schema_file_id, &type_name, &blob)
        }
    };

    std::process::exit(status.exit_code());
}
