use anyhow::Result;
use sqlx::PgPool;
use uuid::Uuid;

use crate::auth::policy::RowFilter;
use crate::auth::{UserRole, UserSession};
use crate::models::*;
use crate::services::*;

const DEMO_INSTRUCTOR_ID: Uuid = Uuid::from_u128(0x6f0c_1a2e_9d4b_4c1e_8a11_0000_0000_0001);
const DEMO_CLIENT_ID: Uuid = Uuid::from_u128(0x6f0c_1a2e_9d4b_4c1e_8a11_0000_0000_0002);

const DEMO_ROUTINE: &str = "Sun Salutation";

const DEMO_EXERCISES: [(&str, &str); 4] = [
    ("Mountain Pose", "Stand tall, feet together, arms at your sides. Breathe evenly."),
    ("Forward Fold", "Hinge at the hips and let the head hang. Bend the knees if needed."),
    ("Downward Dog", "Hands and feet on the mat, hips lifted, heels reaching down."),
    ("Cobra", "Lie on the belly, press through the palms and lift the chest."),
];

/// Idempotent demo data: an instructor, a client, a few exercises and the
/// "Sun Salutation" routine assigned through their relationship.
pub struct DatabaseSeeder {
    pool: PgPool,
}

impl DatabaseSeeder {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn seed_all(&self) -> Result<()> {
        tracing::info!("Starting database seeding...");

        let instructor = self
            .seed_profile(
                DEMO_INSTRUCTOR_ID,
                "instructor@yoga.example",
                "Demo Instructor",
                UserRole::Instructor,
            )
            .await?;
        let client = self
            .seed_profile(
                DEMO_CLIENT_ID,
                "client@yoga.example",
                "Demo Client",
                UserRole::Client,
            )
            .await?;
        let exercise_ids = self.seed_exercises(&instructor).await?;
        let routine_id = self.seed_routine(&instructor, exercise_ids).await?;
        self.seed_assignment(&instructor, &client, routine_id).await?;

        tracing::info!("Database seeding completed!");
        Ok(())
    }

    async fn seed_profile(
        &self,
        supabase_id: Uuid,
        email: &str,
        full_name: &str,
        role: UserRole,
    ) -> Result<UserSession> {
        let profiles = ProfileService::new(self.pool.clone());

        let mut profile = profiles.get_or_provision(supabase_id, email).await?;
        if profile.full_name.is_empty() {
            profile = profiles
                .update(profile.id, UpdateProfileRequest { full_name: Some(full_name.to_string()) })
                .await?;
        }
        if profile.role != role {
            profile = profiles.update_role(profile.id, role).await?;
            tracing::info!("Created demo {} {}", role, profile.email);
        }

        Ok(UserSession {
            profile_id: profile.id,
            supabase_id: profile.supabase_id,
            email: profile.email,
            role: profile.role,
        })
    }

    async fn seed_exercises(&self, instructor: &UserSession) -> Result<Vec<Uuid>> {
        let exercises = ExerciseService::new(self.pool.clone());
        let existing = exercises
            .list(ListQuery { limit: Some(MAX_PAGE_SIZE), offset: None })
            .await?;

        let mut ids = Vec::with_capacity(DEMO_EXERCISES.len());
        for (name, instructions) in DEMO_EXERCISES {
            let found = existing.iter().find(|exercise| {
                exercise.name == name && exercise.created_by == instructor.profile_id
            });

            let id = match found {
                Some(exercise) => exercise.id,
                None => {
                    let request = CreateExerciseRequest {
                        name: name.to_string(),
                        instructions: instructions.to_string(),
                    };
                    exercises.create(instructor.profile_id, request).await?.id
                }
            };
            ids.push(id);
        }

        Ok(ids)
    }

    async fn seed_routine(
        &self,
        instructor: &UserSession,
        exercise_ids: Vec<Uuid>,
    ) -> Result<Uuid> {
        let routines = RoutineService::new(self.pool.clone());
        let owned = routines
            .list(RowFilter::OwnedBy(instructor.profile_id), ListQuery::default())
            .await?;

        if let Some(existing) = owned.iter().find(|r| r.routine.name == DEMO_ROUTINE) {
            return Ok(existing.routine.id);
        }

        // Mountain, fold, dog, cobra, dog, fold, mountain
        let sequence = [0, 1, 2, 3, 2, 1, 0]
            .iter()
            .filter_map(|&i| exercise_ids.get(i).copied())
            .collect();

        let request = CreateRoutineRequest {
            name: DEMO_ROUTINE.to_string(),
            description: "A gentle flow to warm up the whole body.".to_string(),
            is_active: true,
            exercise_ids: sequence,
        };
        let routine = routines.create(instructor.profile_id, request).await?;
        tracing::info!("Created demo routine {}", routine.routine.id);

        Ok(routine.routine.id)
    }

    async fn seed_assignment(
        &self,
        instructor: &UserSession,
        client: &UserSession,
        routine_id: Uuid,
    ) -> Result<()> {
        let relationships = RelationshipService::new(self.pool.clone());
        let page = ListQuery {
            limit: Some(MAX_PAGE_SIZE),
            offset: None,
        };
        let existing = relationships
            .list(RowFilter::PartyTo(instructor.profile_id), page)
            .await?
            .into_iter()
            .find(|detail| detail.client.id == client.profile_id);

        let relationship_id = match existing {
            Some(detail) => detail.id,
            None => {
                let detail = relationships.create(instructor.profile_id, client.profile_id).await?;
                tracing::info!("Created demo relationship {}", detail.id);
                detail.id
            }
        };

        AssignmentService::new(self.pool.clone())
            .assign_routine(relationship_id, routine_id, instructor)
            .await?;

        Ok(())
    }
}
