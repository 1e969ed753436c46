use clap::{Parser, ValueEnum};
use divtrail::{grain128, trivium, CountingBox, StateBits, SuperpolyOutcome, TwoStageOptions};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha20Rng;

#[derive(ValueEnum, Clone, Copy, Debug)]
enum Cipher {
    Trivium,
    Grain128a,
}

#[derive(Parser, Debug)]
#[command(name = "superpoly")]
#[command(about = "Superpoly recovery via three-subset division property trail counting")]
struct Args {
    #[arg(long, value_enum, help = "Target cipher")]
    cipher: Cipher,

    #[arg(
        short = 'r',
        long,
        default_value_t = 0,
        help = "Number of initialization rounds"
    )]
    rounds: usize,

    #[arg(long, help = "Two-stage split round (defaults to rounds/2)")]
    split: Option<usize>,

    #[arg(
        long,
        help = "Verify trail counts against the real cipher on random keys and IVs"
    )]
    practical: bool,

    #[arg(long, default_value_t = 0, help = "RNG seed for practical verification")]
    seed: u64,

    #[arg(
        long,
        help = "Grain-128a only: recover the fifteen 95-active-bit subcube superpolies"
    )]
    subcube: bool,

    #[arg(
        long,
        value_delimiter = ',',
        help = "Trivium only: count trails of one key monomial (1-based key indices)"
    )]
    monomial: Option<Vec<usize>>,

    #[arg(
        long,
        value_delimiter = ',',
        help = "1-based IV indices excluded from the cube in monomial mode"
    )]
    constant_iv: Vec<usize>,
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let args = Args::parse();
    if !args.practical && args.rounds == 0 {
        eprintln!("set the number of rounds with '-r <rounds>'");
        std::process::exit(1);
    }
    let options = TwoStageOptions {
        div_round: args.split,
    };

    match args.cipher {
        Cipher::Trivium => {
            if args.practical {
                practical_trivium(args.rounds, args.seed);
            } else if let Some(monomial) = &args.monomial {
                verify_trivium_monomial(args.rounds, monomial, &args.constant_iv);
            } else {
                run_trivium(args.rounds, options);
            }
        }
        Cipher::Grain128a => {
            if args.practical {
                practical_grain(args.rounds, args.seed);
            } else if args.subcube {
                run_grain_subcube(args.rounds, options);
            } else {
                run_grain(args.rounds, options);
            }
        }
    }
}

fn print_cube(cube: &[bool]) {
    println!("the index of cube");
    let indices: Vec<String> = cube
        .iter()
        .enumerate()
        .filter(|&(_, &active)| active)
        .map(|(i, _)| format!("iv{}", i + 1))
        .collect();
    println!("{}", indices.join(", "));
}

fn print_superpoly<F>(outcome: &SuperpolyOutcome, cube: &[bool], describe: F)
where
    F: Fn(&StateBits, &[bool]) -> String,
{
    println!("*****************************");
    println!("{} monomials involved", outcome.counting.len());
    println!("{} trails in total", outcome.counting.total());

    println!("odd list");
    for (key, count) in &outcome.superpoly.odd {
        println!("1 | {}\t{}", count, describe(key, cube));
    }
    println!();
    println!("even list");
    for (key, count) in &outcome.superpoly.even {
        println!("0 | {}\t{}", count, describe(key, cube));
    }
}

fn run_trivium(rounds: usize, options: TwoStageOptions) {
    eprintln!("{} round trivium", rounds);
    let cube = trivium::known_cube(rounds);
    print_cube(&cube);
    let flags = trivium::attack_flags(&cube);
    match trivium::recover_superpoly(rounds, &cube, &flags, options) {
        Ok(outcome) => print_superpoly(&outcome, &cube, trivium::describe_monomial),
        Err(e) => {
            eprintln!("search failed: {e}");
            std::process::exit(1);
        }
    }
}

fn run_grain(rounds: usize, options: TwoStageOptions) {
    eprintln!("{} round grain128a", rounds);
    let cube = vec![true; grain128::IV_BITS];
    print_cube(&cube);
    let flags = grain128::attack_flags(&cube);
    match grain128::recover_superpoly(rounds, &cube, &flags, options) {
        Ok(outcome) => print_superpoly(&outcome, &cube, grain128::describe_monomial),
        Err(e) => {
            eprintln!("search failed: {e}");
            std::process::exit(1);
        }
    }
}

fn run_grain_subcube(rounds: usize, options: TwoStageOptions) {
    for &pos in &grain128::SUBCUBE_CONSTANT_POSITIONS {
        println!("///////////////////////////////////////////");
        println!("        CONSTANT IV[{}]", pos + 1);
        println!("///////////////////////////////////////////");
        let mut cube = vec![true; grain128::IV_BITS];
        cube[pos] = false;
        print_cube(&cube);
        match grain128::subcube_superpoly(rounds, pos, options) {
            Ok(outcome) => print_superpoly(&outcome, &cube, grain128::describe_monomial),
            Err(e) => {
                eprintln!("search failed: {e}");
                std::process::exit(1);
            }
        }
        println!();
    }
}

fn verify_trivium_monomial(rounds: usize, monomial: &[usize], constant_iv: &[usize]) {
    let cube_indices: Vec<usize> = (0..trivium::IV_BITS)
        .filter(|i| !constant_iv.contains(&(i + 1)))
        .collect();
    let key_indices: Vec<usize> = monomial.iter().map(|&k| k - 1).collect();

    let terms: Vec<String> = key_indices.iter().map(|&k| format!("x{:02}", k + 1)).collect();
    println!("target monomial: {}", terms.join(" * "));

    match trivium::check_monomial(rounds, &cube_indices, &key_indices) {
        Ok(check) => {
            for &(tap, trails) in &check.per_target {
                println!("target s{}: {} trails", tap + 1, trails);
            }
            let exact = check.count_for(&cube_indices, &key_indices);
            println!(
                "exact monomial count {} -> {}",
                exact,
                if exact % 2 == 1 {
                    "present in the superpoly"
                } else {
                    "cancelled"
                }
            );
        }
        Err(e) => {
            eprintln!("search failed: {e}");
            std::process::exit(1);
        }
    }
}

/// Bits as hex, most significant byte first.
fn hex_bits(bits: &[bool]) -> String {
    let mut out = String::new();
    for byte_idx in (0..bits.len() / 8).rev() {
        let mut byte = 0u8;
        for j in (0..8).rev() {
            byte ^= (bits[8 * byte_idx + j] as u8) << j;
        }
        out.push_str(&format!("{:02x}", byte));
    }
    out
}

fn random_cube(rng: &mut ChaCha20Rng, width: usize) -> Vec<bool> {
    let num_active = 1 + rng.gen_range(0..4usize);
    println!("{} active bits", num_active);
    let mut cube = vec![false; width];
    let mut placed = 0;
    while placed < num_active {
        let idx = rng.gen_range(0..width);
        if !cube[idx] {
            cube[idx] = true;
            placed += 1;
        }
    }
    cube
}

fn practical_trivium(rounds: usize, seed: u64) {
    eprintln!("practical verification for trivium");
    let mut rng = ChaCha20Rng::seed_from_u64(seed);
    let cube = random_cube(&mut rng, trivium::IV_BITS);
    print_cube(&cube);
    let flags = trivium::practical_flags(&cube);

    let range = if rounds > 0 {
        rounds..rounds + 1
    } else {
        300..600
    };
    for r in range {
        println!("##############################");
        println!("{} rounds", r);

        let system = trivium::TriviumSystem::new(
            r,
            cube.clone(),
            flags.clone(),
            trivium::TriviumTarget::Combined,
        );
        let mut counting = CountingBox::new();
        if let Err(e) = divtrail::enumerate_trails(&system, &mut counting) {
            eprintln!("search failed: {e}");
            std::process::exit(1);
        }
        if counting.is_empty() {
            println!("zero sum");
        }

        for _trial in 0..100 {
            let key: Vec<bool> = (0..trivium::KEY_BITS).map(|_| rng.gen()).collect();
            let iv: Vec<bool> = (0..trivium::IV_BITS).map(|_| rng.gen()).collect();
            let practical = trivium::cube_sum(r, &cube, &iv, &key);
            let theoretical = trivium::superpoly_sum(&counting, &cube, &iv, &key);
            println!(
                "{}\t{}\t{}\t{}\t{}",
                hex_bits(&key),
                hex_bits(&iv),
                practical as u8,
                theoretical as u8,
                if practical == theoretical { "OK" } else { "error" }
            );
        }
    }
}

fn practical_grain(rounds: usize, seed: u64) {
    eprintln!("practical verification for grain128a");
    let mut rng = ChaCha20Rng::seed_from_u64(seed);
    let cube = random_cube(&mut rng, grain128::IV_BITS);
    print_cube(&cube);
    let flags = grain128::practical_flags(&cube);

    let range = if rounds > 0 { rounds..rounds + 1 } else { 50..120 };
    for r in range {
        println!("##############################");
        println!("{} rounds", r);

        let system = grain128::GrainSystem::new(
            r,
            cube.clone(),
            flags.clone(),
            grain128::GrainTarget::Combined,
        );
        let mut counting = CountingBox::new();
        if let Err(e) = divtrail::enumerate_trails(&system, &mut counting) {
            eprintln!("search failed: {e}");
            std::process::exit(1);
        }
        if counting.is_empty() {
            println!("zero sum");
        }

        for _trial in 0..100 {
            let key: Vec<bool> = (0..grain128::NFSR_BITS).map(|_| rng.gen()).collect();
            let mut iv: Vec<bool> = (0..grain128::LFSR_BITS).map(|_| rng.gen()).collect();
            for bit in iv
                .iter_mut()
                .take(grain128::LFSR_BITS - 1)
                .skip(grain128::IV_BITS)
            {
                *bit = true;
            }
            iv[grain128::LFSR_BITS - 1] = false;
            let practical = grain128::cube_sum(r, &cube, &iv, &key);
            let theoretical = grain128::superpoly_sum(&counting, &cube, &iv, &key);
            println!(
                "{}\t{}\t{}\t{}\t{}",
                hex_bits(&key),
                hex_bits(&iv),
                practical as u8,
                theoretical as u8,
                if practical == theoretical { "OK" } else { "error" }
            );
        }
    }
}
