//! Category scoring for a single five dice roll.

use super::{Category, Dice, N_DICE};

pub const FULL_HOUSE_POINTS: u32 = 25;
pub const SMALL_STRAIGHT_POINTS: u32 = 30;
pub const LARGE_STRAIGHT_POINTS: u32 = 40;
pub const FIVE_OF_A_KIND_POINTS: u32 = 50;

// Face sets as bit masks, bit n standing for face n
const SMALL_STRAIGHTS: [u8; 3] = [0b0001_1110, 0b0011_1100, 0b0111_1000];
const LARGE_STRAIGHTS: [u8; 2] = [0b0011_1110, 0b0111_1100];

// Return the faces if every die has been rolled and shows 1 to 6
fn complete_roll(dice: &Dice) -> Option<[u8; N_DICE]> {
    let mut faces = [0; N_DICE];
    for (face, die) in faces.iter_mut().zip(dice.iter()) {
        match die {
            Some(value @ 1..=6) => *face = *value,
            _ => return None,
        }
    }

    Some(faces)
}

// Number of dice showing each face, indexed by the face value (index 0 unused)
pub fn count_faces(faces: &[u8; N_DICE]) -> [u8; 7] {
    let mut counts = [0; 7];
    for &face in faces {
        counts[face as usize] += 1;
    }
    counts
}

fn face_mask(counts: &[u8; 7]) -> u8 {
    (1..=6)
        .filter(|&face| counts[face] > 0)
        .fold(0, |mask, face| mask | (1 << face))
}

/// Points the roll is worth in the given category.
///
/// An incomplete roll (any die unset) is worth nothing in every category.
pub fn calculate_score(category: Category, dice: &Dice) -> u32 {
    let Some(faces) = complete_roll(dice) else {
        return 0;
    };

    let counts = count_faces(&faces);
    let sum: u32 = faces.iter().map(|&f| f as u32).sum();
    let has_count = |n: u8| counts[1..].iter().any(|&c| c >= n);

    match category {
        Category::Ones
        | Category::Twos
        | Category::Threes
        | Category::Fours
        | Category::Fives
        | Category::Sixes => {
            let face = category.face().unwrap_or(0) as usize;
            counts[face] as u32 * face as u32
        }
        Category::ThreeOfKind => if has_count(3) { sum } else { 0 },
        Category::FourOfKind => if has_count(4) { sum } else { 0 },
        Category::FullHouse => {
            if counts.contains(&3) && counts.contains(&2) {
                FULL_HOUSE_POINTS
            } else {
                0
            }
        }
        Category::SmallStraight => {
            let mask = face_mask(&counts);
            if SMALL_STRAIGHTS.iter().any(|&s| mask & s == s) {
                SMALL_STRAIGHT_POINTS
            } else {
                0
            }
        }
        Category::LargeStraight => {
            let mask = face_mask(&counts);
            if LARGE_STRAIGHTS.iter().any(|&s| mask & s == s) {
                LARGE_STRAIGHT_POINTS
            } else {
                0
            }
        }
        Category::FiveOfAKind => if has_count(5) { FIVE_OF_A_KIND_POINTS } else { 0 },
        Category::Chance => sum,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::games::yahtzee::CATEGORIES;
    use proptest::prelude::*;

    fn roll(faces: [u8; 5]) -> Dice {
        faces.map(Some)
    }

    fn all_rolls() -> impl Iterator<Item = [u8; 5]> {
        (0..7776u32).map(|mut n| {
            let mut faces = [0; 5];
            for face in faces.iter_mut() {
                *face = (n % 6) as u8 + 1;
                n /= 6;
            }
            faces
        })
    }

    #[test]
    fn test_reference_rolls() {
        assert_eq!(calculate_score(Category::FullHouse, &roll([2, 2, 2, 5, 5])), 25);
        assert_eq!(calculate_score(Category::SmallStraight, &roll([1, 2, 3, 4, 6])), 30);
        assert_eq!(calculate_score(Category::LargeStraight, &roll([2, 3, 4, 5, 6])), 40);
        assert_eq!(calculate_score(Category::Chance, &roll([1, 1, 1, 1, 1])), 5);
        assert_eq!(calculate_score(Category::FiveOfAKind, &roll([6, 6, 6, 6, 6])), 50);
    }

    #[test]
    fn test_upper_categories() {
        let dice = roll([3, 3, 5, 3, 1]);
        assert_eq!(calculate_score(Category::Ones, &dice), 1);
        assert_eq!(calculate_score(Category::Twos, &dice), 0);
        assert_eq!(calculate_score(Category::Threes, &dice), 9);
        assert_eq!(calculate_score(Category::Fives, &dice), 5);
        assert_eq!(calculate_score(Category::Sixes, &dice), 0);
    }

    #[test]
    fn test_of_a_kind() {
        assert_eq!(calculate_score(Category::ThreeOfKind, &roll([4, 4, 4, 2, 1])), 15);
        assert_eq!(calculate_score(Category::ThreeOfKind, &roll([4, 4, 3, 2, 1])), 0);
        assert_eq!(calculate_score(Category::FourOfKind, &roll([6, 6, 6, 6, 2])), 26);
        assert_eq!(calculate_score(Category::FourOfKind, &roll([6, 6, 6, 2, 2])), 0);
        // Five alike also counts as three and four alike
        assert_eq!(calculate_score(Category::ThreeOfKind, &roll([5, 5, 5, 5, 5])), 25);
        assert_eq!(calculate_score(Category::FourOfKind, &roll([5, 5, 5, 5, 5])), 25);
    }

    #[test]
    fn test_full_house_needs_exact_counts() {
        assert_eq!(calculate_score(Category::FullHouse, &roll([5, 2, 5, 2, 2])), 25);
        assert_eq!(calculate_score(Category::FullHouse, &roll([4, 4, 4, 4, 4])), 0);
        assert_eq!(calculate_score(Category::FullHouse, &roll([4, 4, 4, 4, 1])), 0);
        assert_eq!(calculate_score(Category::FullHouse, &roll([4, 4, 1, 1, 2])), 0);
    }

    #[test]
    fn test_straights() {
        assert_eq!(calculate_score(Category::SmallStraight, &roll([3, 4, 5, 6, 6])), 30);
        assert_eq!(calculate_score(Category::SmallStraight, &roll([2, 3, 2, 4, 5])), 30);
        assert_eq!(calculate_score(Category::SmallStraight, &roll([1, 2, 3, 5, 6])), 0);
        assert_eq!(calculate_score(Category::LargeStraight, &roll([5, 4, 3, 2, 1])), 40);
        assert_eq!(calculate_score(Category::LargeStraight, &roll([1, 2, 3, 4, 6])), 0);
    }

    #[test]
    fn test_incomplete_roll_scores_nothing() {
        let dice = [Some(6), Some(6), None, Some(6), Some(6)];
        for category in CATEGORIES {
            assert_eq!(calculate_score(category, &dice), 0);
            assert_eq!(calculate_score(category, &[None; 5]), 0);
        }
    }

    #[test]
    fn test_every_roll_scores_within_bounds() {
        for faces in all_rolls() {
            let dice = roll(faces);
            let sum: u32 = faces.iter().map(|&f| f as u32).sum();
            for category in CATEGORIES {
                let score = calculate_score(category, &dice);
                assert_eq!(score, calculate_score(category, &dice));
                match category.face() {
                    Some(face) => assert!(score <= 5 * face as u32 && score % face as u32 == 0),
                    None => assert!(score == 0 || score == sum || score >= 25, "{category:?} {faces:?}"),
                }
            }

            if calculate_score(Category::LargeStraight, &dice) > 0 {
                assert_eq!(calculate_score(Category::SmallStraight, &dice), 30);
            }
            assert_eq!(calculate_score(Category::Chance, &dice), sum);
        }
    }

    proptest! {
        #[test]
        fn score_ignores_dice_order(mut faces in prop::array::uniform5(1..=6u8), idx in 0..13usize) {
            let category = CATEGORIES[idx];
            let before = calculate_score(category, &roll(faces));
            faces.reverse();
            prop_assert_eq!(before, calculate_score(category, &roll(faces)));
        }

        #[test]
        fn upper_scores_add_up_to_chance(faces in prop::array::uniform5(1..=6u8)) {
            let dice = roll(faces);
            let upper: u32 = CATEGORIES
                .iter()
                .filter(|c| c.is_upper())
                .map(|&c| calculate_score(c, &dice))
                .sum();
            prop_assert_eq!(upper, calculate_score(Category::Chance, &dice));
        }
    }
}
