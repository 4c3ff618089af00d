use rand::seq::{index, SliceRandom};
use rand::Rng;
use std::collections::HashMap;

use crate::models::attempt::PresentationPlan;
use crate::models::module::Module;
use crate::models::question::QuestionWithChoices;

pub struct SelectionService;

impl SelectionService {
    /// Samples and orders the questions and choices a new attempt will show.
    ///
    /// `bank` is expected in stored display order. The result is the only
    /// ordering ever used for the attempt afterwards.
    pub fn build_plan<R>(module: &Module, bank: &[QuestionWithChoices], rng: &mut R) -> PresentationPlan
    where
        R: Rng + ?Sized,
    {
        let mut indices: Vec<usize> = match module.pool_size(bank.len()) {
            Some(n) => index::sample(rng, bank.len(), n).into_vec(),
            None => (0..bank.len()).collect(),
        };

        if module.shuffle_questions {
            indices.shuffle(rng);
        } else {
            indices.sort_by_key(|&i| (bank[i].question.display_order, i));
        }

        let mut presented_questions = Vec::with_capacity(indices.len());
        let mut choice_order = HashMap::with_capacity(indices.len());

        for i in indices {
            let question = &bank[i];
            let mut choices: Vec<(i32, usize)> = question
                .choices
                .iter()
                .enumerate()
                .map(|(pos, c)| (c.display_order, pos))
                .collect();
            choices.sort();

            let mut ids: Vec<_> = choices
                .into_iter()
                .map(|(_, pos)| question.choices[pos].id)
                .collect();
            if module.shuffle_choices {
                ids.shuffle(rng);
            }

            presented_questions.push(question.id());
            choice_order.insert(question.id(), ids);
        }

        PresentationPlan {
            presented_questions,
            choice_order,
        }
    }
}
