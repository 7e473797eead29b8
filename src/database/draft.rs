use std::collections::HashSet;

use serde_json::Value;

use crate::{
    constants::{
        MAX_COOKING_TIME, MAX_INGREDIENT_AMOUNT, MAX_RECIPE_NAME_LENGTH, MIN_COOKING_TIME,
        MIN_INGREDIENT_AMOUNT,
    },
    image::ImageSource,
};

use super::{
    error::{ErrorKind, FieldError},
    form::{as_integer, Form, INVALID_INTEGER, REQUIRED},
    schema::Id,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IngredientAmount {
    pub id: Id,
    pub amount: i32,
}

/// Validated write payload of the recipe aggregate.
///
/// Everything that can be checked without the database is checked here;
/// tag and ingredient ids still have to be resolved against the catalogs.
#[derive(Debug, Clone, PartialEq)]
pub struct RecipeDraft {
    pub name: String,
    pub text: String,
    pub image: Option<ImageSource>,
    pub cooking_time: i32,
    pub tags: Vec<Id>,
    pub ingredients: Vec<IngredientAmount>,
}

impl RecipeDraft {
    /// `image_required` is set on create; an update may keep the stored image.
    pub fn from_form(form: &Form, image_required: bool) -> Result<Self, FieldError> {
        let name = form.get_str("name")?;
        if name.chars().count() > MAX_RECIPE_NAME_LENGTH {
            return Err(ErrorKind::Validation.on(
                "name",
                &format!("Ensure this field has no more than {MAX_RECIPE_NAME_LENGTH} characters."),
            ));
        }

        let text = form.get_str("text")?;

        let cooking_time = bounded(
            form.get_integer("cooking_time")?,
            "cooking_time",
            MIN_COOKING_TIME,
            MAX_COOKING_TIME,
        )?;

        let image = match form.get_optional_str("image")? {
            Some(raw) => Some(ImageSource::parse("image", &raw)?),
            None if image_required => return Err(ErrorKind::Validation.on("image", REQUIRED)),
            None => None,
        };

        let ingredients = parse_ingredients(form.get_list("ingredients")?)?;
        let tags = parse_tags(form.get_list("tags")?)?;

        Ok(Self {
            name,
            text,
            image,
            cooking_time,
            tags,
            ingredients,
        })
    }

    pub fn ingredient_ids(&self) -> Vec<Id> {
        self.ingredients.iter().map(|item| item.id).collect()
    }
}

fn bounded(value: i64, field: &str, min: i32, max: i32) -> Result<i32, FieldError> {
    if value < min as i64 || value > max as i64 {
        return Err(ErrorKind::Validation.on(
            field,
            &format!("Ensure this value is between {min} and {max}."),
        ));
    }

    Ok(value as i32)
}

fn parse_id(value: &Value, field: &str) -> Result<Id, FieldError> {
    as_integer(value)
        .filter(|id| *id > 0 && *id <= Id::MAX as i64)
        .map(|id| id as Id)
        .ok_or_else(|| ErrorKind::Validation.on(field, INVALID_INTEGER))
}

fn parse_tags(items: &[Value]) -> Result<Vec<Id>, FieldError> {
    if items.is_empty() {
        return Err(ErrorKind::Validation.on("tags", REQUIRED));
    }

    let mut seen = HashSet::new();
    items
        .iter()
        .map(|item| {
            let id = parse_id(item, "tags")?;
            if !seen.insert(id) {
                return Err(ErrorKind::Conflict.on("tags", &format!("Duplicate tag {id}.")));
            }
            Ok(id)
        })
        .collect()
}

fn parse_ingredients(items: &[Value]) -> Result<Vec<IngredientAmount>, FieldError> {
    if items.is_empty() {
        return Err(ErrorKind::Validation.on("ingredients", REQUIRED));
    }

    let mut seen = HashSet::new();
    items
        .iter()
        .map(|item| {
            let Some(item) = item.as_object() else {
                return Err(ErrorKind::Validation.on(
                    "ingredients",
                    "Expected an object with `id` and `amount`.",
                ));
            };

            let id = match item.get("id") {
                Some(id) => parse_id(id, "ingredients")?,
                None => return Err(ErrorKind::Validation.on("ingredients", REQUIRED)),
            };
            if !seen.insert(id) {
                return Err(ErrorKind::Conflict.on(
                    "ingredients",
                    &format!("Duplicate ingredient {id}."),
                ));
            }

            let amount = match item.get("amount").and_then(as_integer) {
                Some(amount) => bounded(amount, "amount", MIN_INGREDIENT_AMOUNT, MAX_INGREDIENT_AMOUNT)?,
                None => return Err(ErrorKind::Validation.on("amount", INVALID_INTEGER)),
            };

            Ok(IngredientAmount { id, amount })
        })
        .collect()
}

/// Fails on the first requested id the catalog lookup did not return.
pub fn ensure_known(field: &str, requested: &[Id], found: &[Id]) -> Result<(), FieldError> {
    let found: HashSet<&Id> = found.iter().collect();

    match requested.iter().find(|id| !found.contains(id)) {
        Some(id) => Err(ErrorKind::Validation.on(field, &format!("Unknown id {id}."))),
        None => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn draft(value: Value, image_required: bool) -> Result<RecipeDraft, FieldError> {
        let form = Form::from_data(serde_json::from_value(value).unwrap());
        RecipeDraft::from_form(&form, image_required)
    }

    fn payload() -> Value {
        json!({
            "name": "Pancakes",
            "text": "Mix and fry.",
            "image": "https://cdn.example.com/pancakes.png",
            "cooking_time": 20,
            "tags": [2, 1],
            "ingredients": [
                { "id": 7, "amount": 200 },
                { "id": 3, "amount": "2" },
                { "id": 11, "amount": 1 }
            ]
        })
    }

    #[test]
    fn valid_payload_keeps_ingredient_ids_and_amounts_in_order() {
        let draft = draft(payload(), true).unwrap();

        assert_eq!(draft.tags, vec![2, 1]);
        assert_eq!(
            draft.ingredients,
            vec![
                IngredientAmount { id: 7, amount: 200 },
                IngredientAmount { id: 3, amount: 2 },
                IngredientAmount { id: 11, amount: 1 },
            ]
        );
        assert_eq!(draft.ingredient_ids(), vec![7, 3, 11]);
        assert_eq!(
            draft.image,
            Some(ImageSource::Reference(String::from(
                "https://cdn.example.com/pancakes.png"
            )))
        );
    }

    #[test]
    fn duplicate_ingredient_is_a_conflict() {
        let mut value = payload();
        value["ingredients"] = json!([{ "id": 7, "amount": 1 }, { "id": 7, "amount": 5 }]);

        let error = draft(value, true).unwrap_err();
        assert_eq!(error.kind, ErrorKind::Conflict);
        assert_eq!(error.field, "ingredients");
    }

    #[test]
    fn duplicate_tag_is_a_conflict() {
        let mut value = payload();
        value["tags"] = json!([1, "1"]);

        let error = draft(value, true).unwrap_err();
        assert_eq!(error.kind, ErrorKind::Conflict);
        assert_eq!(error.field, "tags");
    }

    #[test]
    fn missing_tags_and_ingredients_are_rejected() {
        let mut value = payload();
        value["tags"] = json!([]);
        assert_eq!(draft(value, true).unwrap_err().field, "tags");

        let mut value = payload();
        value.as_object_mut().unwrap().remove("ingredients");
        let error = draft(value, true).unwrap_err();
        assert_eq!(error.field, "ingredients");
        assert_eq!(error.info, REQUIRED);
    }

    #[test]
    fn amounts_must_be_positive_and_bounded() {
        for amount in [json!(0), json!(-4), json!(32001), json!("many")] {
            let mut value = payload();
            value["ingredients"] = json!([{ "id": 1, "amount": amount }]);

            let error = draft(value, true).unwrap_err();
            assert_eq!(error.kind, ErrorKind::Validation);
            assert_eq!(error.field, "amount");
        }
    }

    #[test]
    fn cooking_time_is_bounded() {
        for time in [0, 32001] {
            let mut value = payload();
            value["cooking_time"] = json!(time);
            assert_eq!(draft(value, true).unwrap_err().field, "cooking_time");
        }

        let mut value = payload();
        value["cooking_time"] = json!(32000);
        assert_eq!(draft(value, true).unwrap().cooking_time, 32000);
    }

    #[test]
    fn image_is_required_only_on_create() {
        let mut value = payload();
        value.as_object_mut().unwrap().remove("image");

        assert_eq!(draft(value.clone(), true).unwrap_err().field, "image");
        assert_eq!(draft(value, false).unwrap().image, None);
    }

    #[test]
    fn invalid_image_payload_is_rejected() {
        let mut value = payload();
        value["image"] = json!("data:image/png;base64,***");

        let error = draft(value, true).unwrap_err();
        assert_eq!(error.field, "image");
    }

    #[test]
    fn overlong_name_is_rejected() {
        let mut value = payload();
        value["name"] = json!("x".repeat(MAX_RECIPE_NAME_LENGTH + 1));

        assert_eq!(draft(value, true).unwrap_err().field, "name");
    }

    #[test]
    fn unknown_ids_name_the_field() {
        assert_eq!(ensure_known("tags", &[1, 2], &[2, 1]), Ok(()));

        let error = ensure_known("ingredients", &[4, 5, 6], &[4, 6]).unwrap_err();
        assert_eq!(error.kind, ErrorKind::Validation);
        assert_eq!(error.field, "ingredients");
        assert_eq!(error.info, "Unknown id 5.");
    }
}
