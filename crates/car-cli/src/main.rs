use std::io::{BufRead, Write};
use std::path::Path;

use clap::{Parser, ValueEnum};

use car::model::{EnumerationDecision, EnumerationPolicy};
use car::{
    BootOptions, BuildType, CompressionType, CreateOptions, CreateVariant, DataModifiers,
    EncryptionType, HostFilesystem, ProcessorType, SystemImageOptions, SystemType,
};

#[derive(Debug, Parser)]
#[command(name = "cartool", about = "Create, extract and inspect CAR archives")]
pub struct Args {
    #[command(subcommand)]
    cmd: Command,
}

#[derive(Debug, clap::Subcommand)]
pub enum Command {
    /// Create an archive from a directory tree
    Create(CreateArgs),
    /// Extract an archive into a directory tree
    Extract(ExtractArgs),
    /// Show archive header information and contents
    Show(ShowArgs),
    /// List the entries of one or more archives
    List(ListArgs),
}

impl Command {
    pub fn verbose(&self) -> bool {
        match self {
            Command::Create(args) => args.verbose,
            Command::Extract(args) => args.verbose,
            Command::Show(_) | Command::List(_) => false,
        }
    }
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum SubtypeArg {
    #[value(name = "1")]
    S1,
    #[value(name = "2")]
    S2,
    #[value(name = "BootX")]
    BootX,
    #[value(name = "SystemImage")]
    SystemImage,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum CompressionArg {
    #[value(name = "LZMA")]
    Lzma,
    #[value(name = "LZO")]
    Lzo,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum EncryptionArg {
    #[value(name = "AES")]
    Aes,
    #[value(name = "Serpent")]
    Serpent,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum ArchArg {
    #[value(name = "x86_64")]
    X86_64,
    #[value(name = "ARMv8")]
    Armv8,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum OsTypeArg {
    #[value(name = "Corona-X")]
    CoronaX,
    #[value(name = "CorOS")]
    CorOs,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum BuildTypeArg {
    Debug,
    Development,
    Release,
    Stable,
}

#[derive(Debug, Clone, Parser)]
pub struct CreateArgs {
    root_directory: String,
    archive: String,

    #[arg(short, long)]
    verbose: bool,
    #[arg(long, value_enum)]
    subtype: SubtypeArg,

    /// Compress every section with the given type (recorded, not applied)
    #[arg(long, value_enum, value_name = "TYPE")]
    apply_compression: Option<CompressionArg>,
    /// Compress a single section: --compress-section <ToC|EntryTable|DataSection> <LZMA|LZO>
    #[arg(long, num_args = 2, value_names = ["SECTION", "TYPE"])]
    compress_section: Vec<String>,
    /// Encrypt everything except the header (recorded, not applied)
    #[arg(long, value_enum, value_name = "TYPE")]
    apply_encryption: Option<EncryptionArg>,
    /// Sign the archive with the given certificate (recorded, not applied)
    #[arg(long, value_name = "CERTIFICATE")]
    sign: Option<String>,

    /// Architecture for a BootX archive
    #[arg(long, value_enum)]
    arch: Option<ArchArg>,
    /// Boot ID value for a BootX archive (decimal or 0x-prefixed hex)
    #[arg(long = "boot-id", value_parser = parse_boot_id)]
    boot_id: Option<u32>,
    #[arg(long)]
    kernel_loader: Option<String>,
    #[arg(long)]
    kernel: Option<String>,
    #[arg(long)]
    boot_config: Option<String>,

    /// System type for a SystemImage archive
    #[arg(long, value_enum)]
    os_type: Option<OsTypeArg>,
    #[arg(long, default_value_t = 0)]
    os_major_version: u8,
    /// Revision letter A-Z
    #[arg(long, value_parser = parse_revision, default_value = "A")]
    os_revision: u8,
    #[arg(long, value_enum)]
    build_type: Option<BuildTypeArg>,
    #[arg(long, value_parser = parse_u64, default_value = "0")]
    build_id: u64,
    /// Read partition flag information from the given file
    #[arg(long)]
    partition_info: Option<String>,
    #[arg(long)]
    boot_archive: Option<String>,
}

#[derive(Debug, Clone, Parser)]
pub struct ExtractArgs {
    archive: String,
    /// Output directory; defaults to the archive path minus its extension
    #[arg(short = 'd', long = "directory")]
    directory: Option<String>,
    #[arg(short, long)]
    verbose: bool,
}

#[derive(Debug, Clone, Parser)]
pub struct ShowArgs {
    #[arg(required = true)]
    archives: Vec<String>,
    /// Show information about the archive header
    #[arg(long, default_value_t = true)]
    show_header: bool,
    /// Show in-depth information about archive entries
    #[arg(long)]
    show_entries: bool,
    /// Show the size of each entry
    #[arg(long)]
    show_size: bool,
    /// Show link targets
    #[arg(long)]
    show_links: bool,
}

#[derive(Debug, Clone, Parser)]
pub struct ListArgs {
    #[arg(required = true)]
    archives: Vec<String>,
    /// Show link targets
    #[arg(long)]
    show_links: bool,
}

fn parse_boot_id(value: &str) -> Result<u32, String> {
    let id = parse_u64(value)? as u32;
    if id == 0 {
        return Err(format!("Invalid BootID '{value}'!"));
    }
    Ok(id)
}

fn parse_u64(value: &str) -> Result<u64, String> {
    let parsed = match value.strip_prefix("0x").or_else(|| value.strip_prefix("0X")) {
        Some(hex) => u64::from_str_radix(hex, 16),
        None => value.parse(),
    };
    parsed.map_err(|_| format!("Invalid number '{value}'!"))
}

fn parse_revision(value: &str) -> Result<u8, String> {
    match value.as_bytes() {
        [c @ b'A'..=b'Z'] => Ok(c - b'A'),
        _ => Err(format!("Invalid OS revision '{value}'!")),
    }
}

/// The interactive enumeration-error policy of the original tool.
struct PromptPolicy;

impl EnumerationPolicy for PromptPolicy {
    fn on_enumeration_error(&mut self, path: &str, _error: &car::Error) -> EnumerationDecision {
        eprintln!("Error: Unknown directory read or access error for directory '{path}'!");
        eprint!("(C)ontinue or (Q)uit? ");
        let _ = std::io::stderr().flush();

        let mut answer = String::new();
        if std::io::stdin().lock().read_line(&mut answer).is_err() {
            eprintln!("Input error!");
            return EnumerationDecision::Quit;
        }
        match answer.trim() {
            "c" | "C" => EnumerationDecision::Continue,
            "q" | "Q" => EnumerationDecision::Quit,
            other => {
                eprintln!("Unknown option '{other}'");
                EnumerationDecision::Quit
            }
        }
    }
}

fn main() {
    let args = Args::parse();
    simple_logger::SimpleLogger::new()
        .with_level(if args.cmd.verbose() {
            log::LevelFilter::Debug
        } else {
            log::LevelFilter::Warn
        })
        .init()
        .unwrap();

    let code = match args.cmd {
        Command::Create(args) => create(args),
        Command::Extract(args) => extract(args),
        Command::Show(args) => show(args),
        Command::List(args) => list(args),
    };
    std::process::exit(code);
}

fn modifiers_from(args: &CreateArgs) -> Result<DataModifiers, String> {
    let mut modifiers = DataModifiers::default();

    if let Some(compression) = args.apply_compression {
        modifiers.compression = Some(match compression {
            CompressionArg::Lzma => CompressionType::Lzma,
            CompressionArg::Lzo => CompressionType::Lzo,
        });
        modifiers.compress_toc = true;
        modifiers.compress_entries = true;
        modifiers.compress_data = true;
    }
    for pair in args.compress_section.chunks(2) {
        match pair[0].as_str() {
            "ToC" => modifiers.compress_toc = true,
            "EntryTable" => modifiers.compress_entries = true,
            "DataSection" => modifiers.compress_data = true,
            section => return Err(format!("Invalid section name '{section}'!")),
        }
        modifiers.compression = Some(match pair[1].as_str() {
            "LZMA" => CompressionType::Lzma,
            "LZO" => CompressionType::Lzo,
            compression => return Err(format!("Invalid compression type '{compression}'!")),
        });
    }
    if let Some(encryption) = args.apply_encryption {
        modifiers.encryption = Some(match encryption {
            EncryptionArg::Aes => EncryptionType::Aes,
            EncryptionArg::Serpent => EncryptionType::Serpent,
        });
    }
    modifiers.signing_certificate = args.sign.clone();

    Ok(modifiers)
}

fn validate_create(args: &CreateArgs) -> Result<CreateOptions, String> {
    let is_bootx = matches!(args.subtype, SubtypeArg::BootX);
    let is_system = matches!(args.subtype, SubtypeArg::SystemImage);

    let modifiers = modifiers_from(args)?;
    if matches!(args.subtype, SubtypeArg::S1) && !modifiers.is_empty() {
        return Err("Subtype 1 archives cannot be compressed, encrypted or signed!".to_string());
    }

    if !is_bootx {
        if args.arch.is_some() {
            return Err("Non-BootX archives cannot have an architecture!".to_string());
        }
        if args.boot_id.is_some() {
            return Err("Non-BootX archives cannot have a BootID!".to_string());
        }
        if args.kernel_loader.is_some() || args.kernel.is_some() || args.boot_config.is_some() {
            return Err("Non-BootX archives don't need kernel information!".to_string());
        }
    }
    if !is_system
        && (args.os_type.is_some()
            || args.build_type.is_some()
            || args.partition_info.is_some()
            || args.boot_archive.is_some())
    {
        return Err("Only System Images can hold system version information!".to_string());
    }

    let variant = match args.subtype {
        SubtypeArg::S1 => CreateVariant::S1,
        SubtypeArg::S2 => CreateVariant::S2,
        SubtypeArg::BootX => CreateVariant::BootX(BootOptions {
            processor: match args.arch.ok_or("BootX archives need an architecture!")? {
                ArchArg::X86_64 => ProcessorType::X86_64,
                ArchArg::Armv8 => ProcessorType::ArmV8,
            },
            boot_id: args.boot_id.ok_or("BootX archives need a BootID!")?,
            kernel_loader_path: args.kernel_loader.clone(),
            kernel_path: args.kernel.clone(),
            boot_config_path: args.boot_config.clone(),
        }),
        SubtypeArg::SystemImage => CreateVariant::SystemImage(SystemImageOptions {
            system: match args.os_type.ok_or("System Images need an OS type!")? {
                OsTypeArg::CoronaX => SystemType::CoronaX,
                OsTypeArg::CorOs => SystemType::CorOs,
            },
            build: match args.build_type.ok_or("System Images need a build type!")? {
                BuildTypeArg::Debug => BuildType::Debug,
                BuildTypeArg::Development => BuildType::Development,
                BuildTypeArg::Release => BuildType::Release,
                BuildTypeArg::Stable => BuildType::Stable,
            },
            revision: args.os_revision,
            major_version: args.os_major_version,
            build_id: args.build_id,
            partition_info_path: args.partition_info.clone(),
            boot_archive_path: args.boot_archive.clone(),
        }),
    };

    Ok(CreateOptions::new(args.root_directory.clone(), variant).with_modifiers(modifiers))
}

fn create(args: CreateArgs) -> i32 {
    let options = match validate_create(&args) {
        Ok(options) => options,
        Err(message) => {
            eprintln!("Error: {message}");
            return 1;
        }
    };
    match car::create_archive(&HostFilesystem, &mut PromptPolicy, &options, &args.archive) {
        Ok(_) => 0,
        Err(error) => {
            eprintln!("Error: {error}");
            1
        }
    }
}

fn extract(args: ExtractArgs) -> i32 {
    let directory = args.directory.unwrap_or_else(|| {
        Path::new(&args.archive)
            .with_extension("")
            .to_string_lossy()
            .into_owned()
    });
    let result = car::Archive::open(&args.archive)
        .and_then(|archive| car::extract_archive(&archive, &HostFilesystem, &directory));
    match result {
        Ok(()) => 0,
        Err(error) => {
            eprintln!("Error: {error}");
            1
        }
    }
}

fn show(args: ShowArgs) -> i32 {
    let mut stdout = std::io::stdout();
    let mut code = 0;
    for path in &args.archives {
        eprintln!("Showing archive {path}:");
        if let Err(error) = car::show::show_information(
            path,
            &mut stdout,
            args.show_header,
            args.show_entries,
            args.show_size,
            args.show_links,
        ) {
            eprintln!("Error: {error}");
            code = 1;
        }
    }
    code
}

fn list(args: ListArgs) -> i32 {
    let mut stdout = std::io::stdout();
    let mut code = 0;
    for path in &args.archives {
        eprintln!("Entries in archive {path}:");
        let result = car::Archive::open(path).and_then(|archive| {
            car::show::list_contents(&archive, &mut stdout, false, args.show_links)
        });
        if let Err(error) = result {
            eprintln!("Error: {error}");
            code = 1;
        }
    }
    code
}
