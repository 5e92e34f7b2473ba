//! Extract a binarized grammar from a treebank.

use std::fs::File;
use std::io::{self, BufRead, BufReader};
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;

use treeshift_core::{cutoff_terminal, signature, Binarize, GrammarExtractor, SymbolTable, TreeReader};

#[derive(Parser, Debug)]
#[command(
    name = "extract-grammar",
    about = "Extract binarized grammar rules and OOV classes from a treebank"
)]
struct Args {
    /// Treebank file with one s-expression tree per line, "-" for stdin
    #[arg(long, default_value = "-")]
    input: String,

    /// Output grammar file
    #[arg(long)]
    output: PathBuf,

    /// Signature used for rare-word classes
    #[arg(long, default_value = "none")]
    signature: String,

    /// Left-branching binarization (the default)
    #[arg(long, conflicts_with = "binarize_right")]
    binarize_left: bool,

    /// Right-branching binarization
    #[arg(long)]
    binarize_right: bool,

    /// Keep terminals seen at least this often; 0 disables the cutoff
    #[arg(long, default_value_t = 3)]
    cutoff: u64,

    /// Print extraction statistics
    #[arg(long)]
    verbose: bool,
}

fn main() -> Result<()> {
    let args = Args::parse();

    let signature = signature::create(&args.signature)
        .with_context(|| format!("unknown signature: {}", args.signature))?;
    let direction = match (args.binarize_left, args.binarize_right) {
        (false, true) => Binarize::Right,
        _ => Binarize::Left,
    };

    let input: Box<dyn BufRead> = if args.input == "-" {
        Box::new(BufReader::new(io::stdin()))
    } else {
        Box::new(BufReader::new(
            File::open(&args.input).with_context(|| format!("cannot open {}", args.input))?,
        ))
    };

    let mut table = SymbolTable::new();
    let mut extractor = GrammarExtractor::new(direction);
    let mut reader = TreeReader::new(input);
    let mut trees = 0u64;
    while let Some(tree) = reader.read_tree(&mut table)? {
        extractor.extract_tree(&table, &tree)?;
        trees += 1;
    }

    if args.cutoff > 0 {
        cutoff_terminal(
            &mut table,
            signature.as_ref(),
            &mut extractor.grammar,
            &mut extractor.unigram,
            args.cutoff,
        );
    }

    extractor
        .grammar
        .write_to_file(&table, &args.output)
        .with_context(|| format!("cannot write {}", args.output.display()))?;

    if args.verbose {
        println!("trees: {trees}");
        println!("unary rules: {}", extractor.grammar.unary.len());
        println!("binary rules: {}", extractor.grammar.binary.len());
        println!("preterminal rules: {}", extractor.grammar.preterminal.len());
        println!("terminals: {}", extractor.unigram.len());
        println!("max unary chain: {}", extractor.unary_max);
    }

    Ok(())
}
