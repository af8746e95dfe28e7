use std::error::Error;

use approx::assert_relative_eq;
use pastiche::offline;
use pastiche::{
    Evaluator, ParsedSpecification, PastifiedSpecification, PastifyConfig, Sample, SpecificationBuilder, Trace,
    VarType, Verdict,
};

fn xs() -> Vec<f64> {
    vec![0.5, -1.25, 3.0, 2.0, -0.75, 4.5, 1.0, -2.0, 0.0, 2.25, -3.5, 1.5]
}

fn ys() -> Vec<f64> {
    vec![1.0, 2.0, -1.0, 0.5, 3.5, -2.5, 0.0, 1.75, -0.5, 2.0, 1.0, -1.5]
}

fn parse(sub_specs: &[&str], formula: &str) -> Result<ParsedSpecification, Box<dyn Error>> {
    let mut builder = SpecificationBuilder::new();
    builder.declare_var("x", VarType::Float)?;
    builder.declare_var("y", VarType::Float)?;
    builder.declare_const("T", VarType::Int, "3")?;

    for sub_spec in sub_specs {
        builder.add_sub_spec(*sub_spec);
    }

    builder.formula(formula);
    Ok(builder.parse()?)
}

fn pastify(formula: &str) -> Result<PastifiedSpecification, Box<dyn Error>> {
    Ok(parse(&[], formula)?.pastify(&PastifyConfig::default())?)
}

fn samples(spec: &PastifiedSpecification) -> Result<Vec<Sample>, Box<dyn Error>> {
    xs().into_iter()
        .zip(ys())
        .map(|(x, y)| spec.sample_from([("x", x), ("y", y)]))
        .collect::<Result<_, _>>()
        .map_err(Into::into)
}

/// Top-level verdicts of every update followed by the verdicts drained at the end of the trace.
fn run(spec: &PastifiedSpecification) -> Result<Vec<Verdict>, Box<dyn Error>> {
    let mut evaluator = Evaluator::new(spec);
    let mut verdicts = Vec::new();

    for (step, sample) in samples(spec)?.iter().enumerate() {
        verdicts.push(evaluator.update(step, sample)?.top());
    }

    verdicts.extend(evaluator.finish()?.iter().map(|outputs| outputs.top()));
    Ok(verdicts)
}

fn settled(verdicts: &[Verdict]) -> Trace<f64> {
    verdicts
        .iter()
        .filter_map(|verdict| match verdict {
            Verdict::Settled { time, robustness } => Some((*time, *robustness)),
            Verdict::Pending => None,
        })
        .collect()
}

#[test]
fn atemporal_formulas_evaluate_each_sample() -> Result<(), Box<dyn Error>> {
    let spec = pastify("x + 2 * y <= T and not (x > y) or abs(x) == 1")?;
    let verdicts = run(&spec)?;

    assert_eq!(spec.max_delay(), 0);
    assert_eq!(verdicts.len(), xs().len());

    for (step, (x, y)) in xs().into_iter().zip(ys()).enumerate() {
        let conjunction = f64::min(3.0 - (x + 2.0 * y), -(x - y));
        let expected = f64::max(conjunction, -(x.abs() - 1.0).abs());

        assert_eq!(verdicts[step].time(), Some(step));
        assert_relative_eq!(verdicts[step].robustness().unwrap_or(f64::NAN), expected);
    }

    Ok(())
}

#[test]
fn zero_width_windows() -> Result<(), Box<dyn Error>> {
    let plain = run(&pastify("x > 1")?)?;

    for formula in ["always[0:0](x > 1)", "eventually[0:0](x > 1)", "once[0:0](x > 1)", "historically[0:0](x > 1)"] {
        let spec = pastify(formula)?;

        assert_eq!(spec.max_delay(), 0);
        assert_eq!(run(&spec)?, plain);
    }

    Ok(())
}

#[test]
fn implication_robustness() -> Result<(), Box<dyn Error>> {
    let spec = pastify("(x > 0) implies (y > 0)")?;
    let verdicts = run(&spec)?;

    for (step, (x, y)) in xs().into_iter().zip(ys()).enumerate() {
        assert_relative_eq!(verdicts[step].robustness().unwrap_or(f64::NAN), f64::max(-x, y));
    }

    let spec = pastify("(x > 0) -> (x > 0)")?;
    let verdicts = run(&spec)?;

    for (step, x) in xs().into_iter().enumerate() {
        assert_relative_eq!(verdicts[step].robustness().unwrap_or(f64::NAN), x.abs());
    }

    Ok(())
}

#[test]
fn widening_always_never_increases_robustness() -> Result<(), Box<dyn Error>> {
    let mut previous: Option<Trace<f64>> = None;

    for bound in 0..6 {
        let robustness = settled(&run(&pastify(&format!("always[0:{}](x > y)", bound))?)?);
        assert_eq!(robustness.len(), xs().len());

        if let Some(previous) = &previous {
            for (time, value) in &robustness {
                assert!(*value <= previous[time], "always[0:{}] at time {}", bound, time);
            }
        }

        previous = Some(robustness);
    }

    Ok(())
}

#[test]
fn evaluators_are_deterministic() -> Result<(), Box<dyn Error>> {
    let spec = pastify("always[0:2]((x > 0) implies eventually[1:3](abs(y) < 2)) or historically[0:T](x + y >= 0)")?;
    let bits = |verdicts: Vec<Verdict>| -> Vec<Option<(usize, u64)>> {
        verdicts
            .into_iter()
            .map(|verdict| match verdict {
                Verdict::Settled { time, robustness } => Some((time, robustness.to_bits())),
                Verdict::Pending => None,
            })
            .collect()
    };

    assert_eq!(bits(run(&spec)?), bits(run(&spec)?));

    Ok(())
}

#[test]
fn start_of_trace_sentinels() -> Result<(), Box<dyn Error>> {
    let once = run(&pastify("once[2:4](x > 0)")?)?;
    let historically = run(&pastify("historically[2:4](x > 0)")?)?;
    let eventually = run(&pastify("eventually[1:4](x > 0)")?)?;

    assert_eq!(once[0], Verdict::Settled { time: 0, robustness: f64::NEG_INFINITY });
    assert_eq!(once[1], Verdict::Settled { time: 1, robustness: f64::NEG_INFINITY });
    assert_eq!(once[2], Verdict::Settled { time: 2, robustness: 0.5 });
    assert_eq!(historically[1], Verdict::Settled { time: 1, robustness: f64::INFINITY });
    assert_eq!(historically[3], Verdict::Settled { time: 3, robustness: -1.25 });

    assert!(eventually[..4].iter().all(|verdict| *verdict == Verdict::Pending));
    assert_eq!(eventually[4], Verdict::Settled { time: 0, robustness: 3.0 });

    // The last time of the trace has no future samples left in its window.
    assert_eq!(eventually.last(), Some(&Verdict::Settled { time: 11, robustness: f64::NEG_INFINITY }));

    Ok(())
}

#[test]
fn online_matches_offline() -> Result<(), Box<dyn Error>> {
    let cases: [(&[&str], &str); 6] = [
        (&[], "eventually[1:3](x > y)"),
        (&[], "(x >= 0) and always[0:2](y <= 2) or not eventually[2:4](x - y < 1)"),
        (&[], "once[0:2](eventually[0:3](x > 0)) implies historically[1:2](y != 0)"),
        (&[], "always[0:T](eventually[1:2](x > 1) or (y == 0.5))"),
        (&["r = eventually[0:2](y > 1)", "s = historically[0:1](r)"], "(x > 0) implies (r and s)"),
        (&["w = always[1:4](x + y > 0)"], "eventually[0:1](w) or once[0:3](w)"),
    ];

    for (sub_specs, formula) in cases {
        let parsed = parse(sub_specs, formula)?;
        let spec = parsed.pastify(&PastifyConfig::default())?;

        let trace: Trace<Sample> = samples(&spec)?.into_iter().enumerate().collect();
        let expected = offline::evaluate(&parsed, &trace, 1.0)?;
        let online = settled(&run(&spec)?);

        assert_eq!(online.len(), xs().len(), "{}", formula);

        for (time, value) in &online {
            assert_relative_eq!(*value, expected[spec.top().index()][time]);
        }
    }

    Ok(())
}

#[test]
fn sampling_period_scales_delay() -> Result<(), Box<dyn Error>> {
    let parsed = parse(&[], "eventually[0:1.5](x > 0)")?;
    let config = PastifyConfig::default().with_sampling_period(0.5);
    let spec = parsed.pastify(&config)?;

    let trace: Trace<Sample> = samples(&spec)?.into_iter().enumerate().collect();
    let expected = offline::evaluate(&parsed, &trace, 0.5)?;
    let online = settled(&run(&spec)?);

    assert_eq!(spec.max_delay(), 3);
    assert_eq!(online, expected[0]);

    Ok(())
}
