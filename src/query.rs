use diesel::dsl::exists;
use diesel::prelude::*;
use serde::Serialize;

use crate::error::StoreError;
use crate::models::{
    Category, CategoryFields, Ingredient, IngredientFields, Menu, MenuFields, Recipe,
    RecipeFields, RecipeIngredient, UsageChange,
};
use crate::params::FromParams;
use crate::report::{DashboardStats, UsageRecord};

no_arg_sql_function!(
    last_insert_id,
    diesel::sql_types::Unsigned<diesel::sql_types::Bigint>
);

/// A table of homogeneous records managed through create/read/update/delete.
///
/// Implementors only supply the row-level queries; the not-found and
/// deleted-or-not semantics live in the free functions below so every
/// resource behaves the same way.
pub(crate) trait Resource: Serialize + Sized + Send + 'static {
    /// Singular name used in messages.
    const NAME: &'static str;

    /// The allow-listed columns a client may write.
    type Fields: FromParams + Send + 'static;

    /// All rows, name ascending.
    fn load_all(conn: &MysqlConnection) -> QueryResult<Vec<Self>>;

    fn load_one(id: i32, conn: &MysqlConnection) -> QueryResult<Option<Self>>;

    fn exists(id: i32, conn: &MysqlConnection) -> QueryResult<bool>;

    /// Returns the generated id.
    fn insert(fields: &Self::Fields, conn: &MysqlConnection) -> QueryResult<i32>;

    fn replace(id: i32, fields: &Self::Fields, conn: &MysqlConnection) -> QueryResult<usize>;

    fn remove(id: i32, conn: &MysqlConnection) -> QueryResult<usize>;
}

pub(crate) fn list<R: Resource>(conn: &MysqlConnection) -> Result<Vec<R>, StoreError> {
    Ok(R::load_all(conn)?)
}

pub(crate) fn get<R: Resource>(id: i32, conn: &MysqlConnection) -> Result<R, StoreError> {
    R::load_one(id, conn)?.ok_or_else(|| StoreError::not_found(R::NAME, id))
}

pub(crate) fn create<R: Resource>(
    fields: &R::Fields,
    conn: &MysqlConnection,
) -> Result<i32, StoreError> {
    let id = R::insert(fields, conn)?;
    log::debug!("created {} {}", R::NAME, id);
    Ok(id)
}

// MySQL reports zero affected rows for an update that changes nothing, so
// existence is checked separately instead of trusting the row count.
pub(crate) fn update<R: Resource>(
    id: i32,
    fields: &R::Fields,
    conn: &MysqlConnection,
) -> Result<(), StoreError> {
    if !R::exists(id, conn)? {
        return Err(StoreError::not_found(R::NAME, id));
    }
    R::replace(id, fields, conn)?;
    Ok(())
}

pub(crate) fn delete<R: Resource>(id: i32, conn: &MysqlConnection) -> Result<bool, StoreError> {
    Ok(R::remove(id, conn)? > 0)
}

fn inserted_id(conn: &MysqlConnection) -> QueryResult<i32> {
    let id: u64 = diesel::select(last_insert_id).get_result(conn)?;
    i32::try_from(id).map_err(|e| diesel::result::Error::DeserializationError(Box::new(e)))
}

/// Implements [`Resource`] for a table whose rows map one-to-one onto the
/// model and which has a `name` column to sort by.
macro_rules! plain_resource {
    ($model:ty, $fields:ty, $table:ident, $name:expr) => {
        impl Resource for $model {
            const NAME: &'static str = $name;
            type Fields = $fields;

            fn load_all(conn: &MysqlConnection) -> QueryResult<Vec<Self>> {
                use crate::schema::$table;
                $table::table
                    .order(($table::name.asc(), $table::id.asc()))
                    .load(conn)
            }

            fn load_one(id: i32, conn: &MysqlConnection) -> QueryResult<Option<Self>> {
                use crate::schema::$table;
                $table::table.find(id).first(conn).optional()
            }

            fn exists(id: i32, conn: &MysqlConnection) -> QueryResult<bool> {
                use crate::schema::$table;
                diesel::select(exists($table::table.find(id))).get_result(conn)
            }

            fn insert(fields: &Self::Fields, conn: &MysqlConnection) -> QueryResult<i32> {
                use crate::schema::$table;
                diesel::insert_into($table::table)
                    .values(fields)
                    .execute(conn)?;
                inserted_id(conn)
            }

            fn replace(
                id: i32,
                fields: &Self::Fields,
                conn: &MysqlConnection,
            ) -> QueryResult<usize> {
                use crate::schema::$table;
                diesel::update($table::table.find(id)).set(fields).execute(conn)
            }

            fn remove(id: i32, conn: &MysqlConnection) -> QueryResult<usize> {
                use crate::schema::$table;
                diesel::delete($table::table.find(id)).execute(conn)
            }
        }
    };
}

plain_resource!(Category, CategoryFields, category, "category");
plain_resource!(Menu, MenuFields, menu, "menu");
plain_resource!(Recipe, RecipeFields, recipe, "recipe");

impl Resource for Ingredient {
    const NAME: &'static str = "ingredient";
    type Fields = IngredientFields;

    fn load_all(conn: &MysqlConnection) -> QueryResult<Vec<Self>> {
        use crate::schema::{category, ingredient};

        ingredient::table
            .left_join(category::table)
            .select((
                ingredient::id,
                ingredient::name,
                ingredient::presentation,
                ingredient::purchase_price,
                ingredient::category_id,
                ingredient::supplier_id,
                ingredient::image,
                category::name.nullable(),
            ))
            .order((ingredient::name.asc(), ingredient::id.asc()))
            .load(conn)
    }

    fn load_one(id: i32, conn: &MysqlConnection) -> QueryResult<Option<Self>> {
        use crate::schema::{category, ingredient};

        ingredient::table
            .left_join(category::table)
            .filter(ingredient::id.eq(id))
            .select((
                ingredient::id,
                ingredient::name,
                ingredient::presentation,
                ingredient::purchase_price,
                ingredient::category_id,
                ingredient::supplier_id,
                ingredient::image,
                category::name.nullable(),
            ))
            .first(conn)
            .optional()
    }

    fn exists(id: i32, conn: &MysqlConnection) -> QueryResult<bool> {
        use crate::schema::ingredient;
        diesel::select(exists(ingredient::table.find(id))).get_result(conn)
    }

    fn insert(fields: &Self::Fields, conn: &MysqlConnection) -> QueryResult<i32> {
        use crate::schema::ingredient;
        diesel::insert_into(ingredient::table)
            .values(fields)
            .execute(conn)?;
        inserted_id(conn)
    }

    fn replace(id: i32, fields: &Self::Fields, conn: &MysqlConnection) -> QueryResult<usize> {
        use crate::schema::ingredient;
        diesel::update(ingredient::table.find(id))
            .set(fields)
            .execute(conn)
    }

    fn remove(id: i32, conn: &MysqlConnection) -> QueryResult<usize> {
        use crate::schema::ingredient;
        diesel::delete(ingredient::table.find(id)).execute(conn)
    }
}

/// Every usage record joined with its ingredient and, when there is one,
/// the ingredient's category.
pub(crate) fn find_usage_records(conn: &MysqlConnection) -> Result<Vec<UsageRecord>, StoreError> {
    use crate::schema::{category, ingredient, recipe_ingredient};

    let records = ingredient::table
        .inner_join(recipe_ingredient::table)
        .left_join(category::table)
        .select((
            recipe_ingredient::recipe_id,
            recipe_ingredient::ingredient_id,
            ingredient::name,
            ingredient::presentation,
            ingredient::purchase_price,
            category::name.nullable(),
            recipe_ingredient::quantity_used,
            recipe_ingredient::cost_of_use,
            ingredient::image,
        ))
        .load::<UsageRecord>(conn)?;
    Ok(records)
}

pub(crate) fn add_usage(usage: &RecipeIngredient, conn: &MysqlConnection) -> Result<(), StoreError> {
    use crate::schema::recipe_ingredient;

    diesel::insert_into(recipe_ingredient::table)
        .values(usage)
        .execute(conn)?;
    Ok(())
}

pub(crate) fn update_usage(
    usage: &RecipeIngredient,
    conn: &MysqlConnection,
) -> Result<(), StoreError> {
    use crate::schema::recipe_ingredient;

    let key = (usage.recipe_id, usage.ingredient_id);
    let found: bool =
        diesel::select(exists(recipe_ingredient::table.find(key))).get_result(conn)?;
    if !found {
        return Err(StoreError::not_found(
            "recipe ingredient",
            format!("{}/{}", usage.recipe_id, usage.ingredient_id),
        ));
    }

    diesel::update(recipe_ingredient::table.find(key))
        .set(&UsageChange::from(usage))
        .execute(conn)?;
    Ok(())
}

pub(crate) fn remove_usage(
    recipe_id: i32,
    ingredient_id: i32,
    conn: &MysqlConnection,
) -> Result<bool, StoreError> {
    use crate::schema::recipe_ingredient;

    let removed = diesel::delete(recipe_ingredient::table.find((recipe_id, ingredient_id)))
        .execute(conn)?;
    Ok(removed > 0)
}

pub(crate) fn count_entities(conn: &MysqlConnection) -> Result<DashboardStats, StoreError> {
    use crate::schema::{category, ingredient, menu, recipe};

    Ok(DashboardStats {
        total_ingredients: ingredient::table.count().get_result(conn)?,
        total_recipes: recipe::table.count().get_result(conn)?,
        total_categories: category::table.count().get_result(conn)?,
        total_menus: menu::table.count().get_result(conn)?,
    })
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::report;
    use diesel::r2d2;

    fn test_database_url() -> String {
        std::env::var("TEST_DATABASE_URL")
            .expect("TEST_DATABASE_URL must point at a migrated database")
    }

    /// A connection inside a transaction that is never committed.
    pub(crate) fn test_connection() -> MysqlConnection {
        let conn = MysqlConnection::establish(&test_database_url())
            .expect("connect to TEST_DATABASE_URL");
        conn.begin_test_transaction().expect("begin test transaction");
        conn
    }

    #[derive(Debug)]
    struct RollbackOnAcquire;

    impl r2d2::CustomizeConnection<MysqlConnection, r2d2::Error> for RollbackOnAcquire {
        fn on_acquire(&self, conn: &mut MysqlConnection) -> Result<(), r2d2::Error> {
            conn.begin_test_transaction().map_err(r2d2::Error::QueryError)
        }
    }

    /// A single-connection pool whose connection never commits, for driving
    /// handlers end to end.
    pub(crate) fn test_pool() -> crate::DbPool {
        let manager = r2d2::ConnectionManager::<MysqlConnection>::new(test_database_url());
        r2d2::Pool::builder()
            .max_size(1)
            .connection_customizer(Box::new(RollbackOnAcquire))
            .build(manager)
            .expect("build test pool")
    }

    fn category(name: &str, conn: &MysqlConnection) -> i32 {
        create::<Category>(&CategoryFields { name: name.into() }, conn).unwrap()
    }

    fn milk(category_id: Option<i32>) -> IngredientFields {
        IngredientFields {
            name: "Milk".into(),
            presentation: "1L".into(),
            purchase_price: 2.5,
            category_id,
            supplier_id: None,
            image: None,
        }
    }

    #[test]
    #[ignore = "needs TEST_DATABASE_URL"]
    fn create_then_get_returns_the_fields() {
        let conn = test_connection();

        let id = create::<Recipe>(
            &RecipeFields {
                name: "Flan".into(),
                description: "Caramel custard".into(),
            },
            &conn,
        )
        .unwrap();

        let recipe: Recipe = get(id, &conn).unwrap();
        assert_eq!(
            recipe,
            Recipe {
                id,
                name: "Flan".into(),
                description: "Caramel custard".into(),
            }
        );
    }

    #[test]
    #[ignore = "needs TEST_DATABASE_URL"]
    fn get_missing_is_not_found() {
        let conn = test_connection();

        let err = get::<Menu>(i32::MAX, &conn).unwrap_err();
        assert!(matches!(err, StoreError::NotFound { resource: "menu", .. }));
    }

    #[test]
    #[ignore = "needs TEST_DATABASE_URL"]
    fn delete_reports_removal_once() {
        let conn = test_connection();

        let id = create::<Menu>(&MenuFields { name: "Lunch".into() }, &conn).unwrap();
        assert!(delete::<Menu>(id, &conn).unwrap());
        assert!(!delete::<Menu>(id, &conn).unwrap());
    }

    #[test]
    #[ignore = "needs TEST_DATABASE_URL"]
    fn update_replaces_fields_and_tolerates_no_change() {
        let conn = test_connection();

        let id = category("Dairy", &conn);
        let fields = CategoryFields { name: "Cheese".into() };
        update::<Category>(id, &fields, &conn).unwrap();
        update::<Category>(id, &fields, &conn).unwrap();

        let cat: Category = get(id, &conn).unwrap();
        assert_eq!(cat.name, "Cheese");
    }

    #[test]
    #[ignore = "needs TEST_DATABASE_URL"]
    fn update_missing_is_not_found() {
        let conn = test_connection();

        let err = update::<Category>(i32::MAX, &CategoryFields { name: "x".into() }, &conn)
            .unwrap_err();
        assert!(matches!(err, StoreError::NotFound { .. }));
    }

    #[test]
    #[ignore = "needs TEST_DATABASE_URL"]
    fn list_is_sorted_by_name() {
        let conn = test_connection();

        for name in ["zz-Spices", "zz-Bakery", "zz-Meat"] {
            category(name, &conn);
        }

        let names: Vec<String> = list::<Category>(&conn)
            .unwrap()
            .into_iter()
            .map(|c| c.name)
            .filter(|n| n.starts_with("zz-"))
            .collect();
        assert_eq!(names, ["zz-Bakery", "zz-Meat", "zz-Spices"]);
    }

    #[test]
    #[ignore = "needs TEST_DATABASE_URL"]
    fn ingredient_carries_its_category_name() {
        let conn = test_connection();

        let dairy = category("Dairy", &conn);
        let id = create::<Ingredient>(&milk(Some(dairy)), &conn).unwrap();

        let ingredient: Ingredient = get(id, &conn).unwrap();
        assert_eq!(ingredient.category_name.as_deref(), Some("Dairy"));
        assert_eq!(ingredient.purchase_price, 2.5);

        let uncategorized = create::<Ingredient>(&milk(None), &conn).unwrap();
        let ingredient: Ingredient = get(uncategorized, &conn).unwrap();
        assert_eq!(ingredient.category_name, None);
    }

    #[test]
    #[ignore = "needs TEST_DATABASE_URL"]
    fn ingredient_update_clears_absent_optionals() {
        let conn = test_connection();

        let dairy = category("Dairy", &conn);
        let id = create::<Ingredient>(&milk(Some(dairy)), &conn).unwrap();
        update::<Ingredient>(id, &milk(None), &conn).unwrap();

        let ingredient: Ingredient = get(id, &conn).unwrap();
        assert_eq!(ingredient.category_id, None);
        assert_eq!(ingredient.name, "Milk");
    }

    #[test]
    #[ignore = "needs TEST_DATABASE_URL"]
    fn usage_report_broadcasts_times_used() {
        let conn = test_connection();

        let milk_id = create::<Ingredient>(&milk(None), &conn).unwrap();
        let flan = create::<Recipe>(
            &RecipeFields { name: "Flan".into(), description: String::new() },
            &conn,
        )
        .unwrap();
        let cake = create::<Recipe>(
            &RecipeFields { name: "Cake".into(), description: String::new() },
            &conn,
        )
        .unwrap();

        for (recipe_id, qty, cost) in [(flan, 2.0, 5.0), (cake, 3.0, 7.5)] {
            add_usage(
                &RecipeIngredient {
                    recipe_id,
                    ingredient_id: milk_id,
                    quantity_used: qty,
                    cost_of_use: cost,
                },
                &conn,
            )
            .unwrap();
        }

        let rows: Vec<_> = report::aggregate(find_usage_records(&conn).unwrap())
            .into_iter()
            .filter(|row| row.ingredient_id == milk_id)
            .collect();
        assert_eq!(rows.len(), 2);
        assert!(rows.iter().all(|row| row.times_used == 2));
        assert!(rows.iter().all(|row| row.category_name == report::UNCATEGORIZED));
    }

    #[test]
    #[ignore = "needs TEST_DATABASE_URL"]
    fn update_usage_requires_an_existing_pair() {
        let conn = test_connection();

        let err = update_usage(
            &RecipeIngredient {
                recipe_id: i32::MAX,
                ingredient_id: i32::MAX,
                quantity_used: 1.0,
                cost_of_use: 1.0,
            },
            &conn,
        )
        .unwrap_err();
        assert!(matches!(err, StoreError::NotFound { .. }));
        assert!(!remove_usage(i32::MAX, i32::MAX, &conn).unwrap());
    }

    fn usage(recipe_id: i32, ingredient_id: i32, quantity: f64, cost: f64) -> RecipeIngredient {
        RecipeIngredient {
            recipe_id,
            ingredient_id,
            quantity_used: quantity,
            cost_of_use: cost,
        }
    }

    fn recipe(name: &str, conn: &MysqlConnection) -> i32 {
        create::<Recipe>(
            &RecipeFields { name: name.into(), description: String::new() },
            conn,
        )
        .unwrap()
    }

    #[test]
    #[ignore = "needs TEST_DATABASE_URL"]
    fn adding_the_same_pair_twice_is_a_constraint_violation() {
        let conn = test_connection();

        let milk_id = create::<Ingredient>(&milk(None), &conn).unwrap();
        let flan = recipe("Flan", &conn);
        add_usage(&usage(flan, milk_id, 1.0, 2.0), &conn).unwrap();

        let err = add_usage(&usage(flan, milk_id, 3.0, 4.0), &conn).unwrap_err();
        assert!(matches!(err, StoreError::Constraint(_)), "{err:?}");
        assert!(!err.is_storage_fault());
    }

    #[test]
    #[ignore = "needs TEST_DATABASE_URL"]
    fn usage_for_a_missing_recipe_is_a_constraint_violation() {
        let conn = test_connection();

        let milk_id = create::<Ingredient>(&milk(None), &conn).unwrap();
        let err = add_usage(&usage(i32::MAX, milk_id, 1.0, 1.0), &conn).unwrap_err();
        assert!(matches!(err, StoreError::Constraint(_)), "{err:?}");
    }

    #[test]
    #[ignore = "needs TEST_DATABASE_URL"]
    fn update_usage_changes_the_amounts() {
        let conn = test_connection();

        let milk_id = create::<Ingredient>(&milk(None), &conn).unwrap();
        let flan = recipe("Flan", &conn);
        add_usage(&usage(flan, milk_id, 1.0, 2.0), &conn).unwrap();
        update_usage(&usage(flan, milk_id, 0.5, 1.25), &conn).unwrap();

        let row = report::aggregate(find_usage_records(&conn).unwrap())
            .into_iter()
            .find(|row| row.recipe_id == flan && row.ingredient_id == milk_id)
            .unwrap();
        assert_eq!(row.total_quantity_used, 0.5);
        assert_eq!(row.total_cost_of_use, 1.25);

        assert!(remove_usage(flan, milk_id, &conn).unwrap());
        assert!(!remove_usage(flan, milk_id, &conn).unwrap());
    }

    #[test]
    #[ignore = "needs TEST_DATABASE_URL"]
    fn counts_follow_inserts() {
        let conn = test_connection();

        let before = count_entities(&conn).unwrap();
        category("Dairy", &conn);
        create::<Ingredient>(&milk(None), &conn).unwrap();
        recipe("Flan", &conn);
        create::<Menu>(&MenuFields { name: "Lunch".into() }, &conn).unwrap();
        create::<Menu>(&MenuFields { name: "Dinner".into() }, &conn).unwrap();

        let after = count_entities(&conn).unwrap();
        assert_eq!(after.total_categories, before.total_categories + 1);
        assert_eq!(after.total_ingredients, before.total_ingredients + 1);
        assert_eq!(after.total_recipes, before.total_recipes + 1);
        assert_eq!(after.total_menus, before.total_menus + 2);
    }
}
