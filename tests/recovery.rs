use approx::assert_relative_eq;
use mnlrs::data::{ChoiceData, ChoiceDataBuilder};
use mnlrs::design::{expand_categorical, hstack};
use mnlrs::likelihood::LogLikelihood;
use mnlrs::{
    CovarianceSource, MaximumLikelihood, MetropolisHastings, MleOptions, MultinomialLogit,
    SamplerOptions,
};
use nalgebra::{DMatrix, DVector};
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};

const TRUE_BETA: [f64; 4] = [-0.1, 0.9, 0.5, -0.7];

/// Streaming-service conjoint: price, brand (hulu/netflix/prime) and ad (no/yes), three
/// profiles per task, choices drawn from the logit at `TRUE_BETA`.
fn conjoint(decisions: usize, seed: u64) -> ChoiceData {
    let mut rng = SmallRng::seed_from_u64(seed);
    let brands = ["hulu", "netflix", "prime"];
    let prices = [8.0, 12.0, 16.0, 20.0, 24.0, 28.0, 32.0];
    let rows = decisions * 3;

    let mut respondents = Vec::with_capacity(rows);
    let mut tasks = Vec::with_capacity(rows);
    let mut brand = Vec::with_capacity(rows);
    let mut ad = Vec::with_capacity(rows);
    let mut price = Vec::with_capacity(rows);
    for d in 0..decisions {
        for _ in 0..3 {
            respondents.push(format!("r{}", d / 10));
            tasks.push(format!("t{}", d % 10));
            brand.push(brands[rng.gen_range(0..3)]);
            ad.push(if rng.gen_bool(0.5) { "yes" } else { "no" });
            price.push(prices[rng.gen_range(0..prices.len())]);
        }
    }

    let brand_cols = expand_categorical("brand", &brand, Some("hulu")).unwrap();
    let ad_cols = expand_categorical("ad", &ad, Some("no")).unwrap();
    let price_col = DMatrix::from_column_slice(rows, 1, &price);
    let price_name = vec!["price".to_string()];
    let (names, x) = hstack(&[
        (price_name.as_slice(), &price_col),
        (brand_cols.names.as_slice(), &brand_cols.matrix),
        (ad_cols.names.as_slice(), &ad_cols.matrix),
    ])
    .unwrap();
    assert_eq!(names, vec!["price", "brand_netflix", "brand_prime", "ad_yes"]);

    // Group once with placeholder choices to get probabilities, then draw the real choices.
    let placeholder: Vec<bool> = (0..rows).map(|r| r % 3 == 0).collect();
    let grouped = ChoiceDataBuilder::new(respondents.clone(), placeholder, 3)
        .tasks(tasks.clone())
        .features(x.clone())
        .build()
        .unwrap();
    let beta = DVector::from_row_slice(&TRUE_BETA);
    let probabilities = MultinomialLogit::default()
        .choice_probabilities(&beta, &grouped)
        .unwrap();

    let mut chosen = vec![false; rows];
    for (d, row) in probabilities.row_iter().enumerate() {
        let u: f64 = rng.gen();
        let mut cumulative = 0.0;
        let mut pick = 2;
        for (offset, p) in row.iter().enumerate() {
            cumulative += p;
            if u < cumulative {
                pick = offset;
                break;
            }
        }
        chosen[d * 3 + pick] = true;
    }

    ChoiceDataBuilder::new(respondents, chosen, 3)
        .tasks(tasks)
        .features(x)
        .names(names)
        .build()
        .unwrap()
}

#[test]
fn mle_recovers_generating_coefficients() {
    let data = conjoint(20_000, 1);
    let fit = MaximumLikelihood::new(&data)
        .fit(&MleOptions::default())
        .unwrap();
    for (estimate, truth) in fit.beta.iter().zip(TRUE_BETA.iter()) {
        assert!(
            (estimate - truth).abs() < 0.05,
            "estimate {estimate} too far from {truth}\n{fit}"
        );
    }
    for row in &fit.coefficients {
        assert!(row.ci_lower < row.estimate && row.estimate < row.ci_upper);
    }
}

#[test]
fn log_likelihood_ignores_decision_order() {
    let data = conjoint(300, 2);
    let model = MultinomialLogit::default();
    let beta = DVector::from_row_slice(&TRUE_BETA);
    let order: Vec<usize> = (0..data.decision_count()).rev().collect();
    let reversed = data.reordered(&order).unwrap();
    assert_relative_eq!(
        model.log_likelihood(&beta, &data).unwrap(),
        model.log_likelihood(&beta, &reversed).unwrap(),
        epsilon = 1e-9
    );
}

#[test]
fn weak_prior_posterior_mean_matches_mle() {
    let data = conjoint(1_000, 3);
    let fit = MaximumLikelihood::new(&data)
        .fit(&MleOptions::default().with_covariance(CovarianceSource::AnalyticHessian))
        .unwrap();

    let options = SamplerOptions::new(
        DVector::from_vec(vec![0.005, 0.08, 0.08, 0.06]),
        DVector::from_vec(vec![10.0, 100.0, 100.0, 100.0]),
    )
    .with_iterations(11_000)
    .with_burn_in(1_000)
    .with_seed(7);
    let sample = MetropolisHastings::new(&data, options)
        .unwrap()
        .run_seeded()
        .unwrap();
    assert_eq!(sample.draws().len(), 10_000);

    let summary = sample.summarize().unwrap();
    for ((posterior, mle), se) in summary
        .coefficients
        .iter()
        .zip(fit.beta.iter())
        .zip(fit.std_errors().iter())
    {
        assert!(
            (posterior.mean - mle).abs() < 0.01,
            "{}: posterior mean {} vs mle {} (se {se})",
            posterior.name,
            posterior.mean,
            mle
        );
        assert!(posterior.ci_lower < *mle && *mle < posterior.ci_upper);
        assert_relative_eq!(posterior.sd, *se, max_relative = 0.3);
    }

    let rate = sample.acceptance_rate();
    assert!(rate > 0.05 && rate < 0.95, "acceptance rate {rate}");
    let downhill = sample.downhill_acceptance_rate().expect("downhill proposals");
    assert!(downhill < 1.0);
}

#[test]
fn dataset_is_reusable_across_runs() {
    let data = conjoint(200, 4);
    let first = MaximumLikelihood::new(&data)
        .fit(&MleOptions::default())
        .unwrap();
    let options = SamplerOptions::uniform(4, 0.02, 5.0)
        .with_iterations(400)
        .with_burn_in(100)
        .with_initial(first.beta.clone());
    let sample = MetropolisHastings::new(&data, options)
        .unwrap()
        .run_seeded()
        .unwrap();
    assert_eq!(sample.trace()[0].len(), 4);

    let second = MaximumLikelihood::new(&data)
        .fit(&MleOptions::default())
        .unwrap();
    assert_eq!(first.beta, second.beta);
}
