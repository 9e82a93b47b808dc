//! Discord adapter: gateway connection, interaction routing, and the
//! HTTP-backed implementations of the engine's collaborator contracts.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use anyhow::{Result, anyhow};
use async_trait::async_trait;
use tracing::{debug, error, info, warn};

use serenity::all::{
    ActionRowComponent, ButtonStyle, ChannelId, Client as SerenityClient,
    ComponentInteraction, ComponentInteractionDataKind, Context as SerenityContext,
    CreateActionRow, CreateButton, CreateInputText, CreateInteractionResponse,
    CreateInteractionResponseMessage, CreateMessage, CreateModal, CreateSelectMenu,
    CreateSelectMenuKind, CreateSelectMenuOption, EditMember, EditMessage,
    EventHandler as SerenityEventHandler, GatewayIntents, GuildId, Http, InputTextStyle,
    Interaction, Message as SerenityMessage, MessageId, ModalInteraction, Permissions, Ready,
    RoleId, UserId,
};
use tokio::sync::{Mutex as AsyncMutex, RwLock, oneshot};

use crate::config::Config;
use crate::db::{GuildConfigStore, RequestFlavor};
use crate::engine::{
    CardLocation, DecisionResult, EngineError, FormInput, MemberActions, MemberDirectory,
    MemberProfile, RequestEngine, ReviewSurface,
};
use crate::pagination::{ROLE_SELECT_PAGE_SIZE, SETTINGS_LIST_PAGE_SIZE, paginate};
use crate::sessions::{CaptureMessage, CaptureOutcome, CaptureTarget, SessionStore};

const INITIAL_LOGIN_RETRY_SECONDS: u64 = 2;
const MAX_LOGIN_RETRY_SECONDS: u64 = 300;

pub mod render;

/// Shared slot for the gateway's HTTP client, filled in at Ready. Everything
/// built before login borrows this handle instead of the client itself.
#[derive(Clone, Default)]
pub struct HttpHandle {
    slot: Arc<RwLock<Option<Arc<Http>>>>,
}

impl HttpHandle {
    pub fn new() -> Self {
        Self::default()
    }

    async fn set(&self, http: Arc<Http>) {
        *self.slot.write().await = Some(http);
    }

    async fn get(&self) -> Result<Arc<Http>> {
        self.slot
            .read()
            .await
            .clone()
            .ok_or_else(|| anyhow!("discord http client not available"))
    }
}

fn parse_snowflake(kind: &str, value: &str) -> Result<u64> {
    value
        .parse()
        .map_err(|_| anyhow!("invalid {kind}: {value}"))
}

/// The engine's collaborator contracts, backed by the Discord HTTP API.
#[derive(Clone)]
pub struct DiscordApi {
    http: HttpHandle,
}

impl DiscordApi {
    pub fn new(http: HttpHandle) -> Self {
        Self { http }
    }
}

#[async_trait]
impl MemberDirectory for DiscordApi {
    async fn get_member(
        &self,
        guild_id: &str,
        user_id: &str,
    ) -> Result<Option<MemberProfile>> {
        let http = self.http.get().await?;
        let guild_id = GuildId::new(parse_snowflake("guild id", guild_id)?);
        let user_id = UserId::new(parse_snowflake("user id", user_id)?);

        let member = match http.get_member(guild_id, user_id).await {
            Ok(member) => member,
            Err(serenity::Error::Http(http_err))
                if http_err.status_code().map(|code| code.as_u16()) == Some(404) =>
            {
                return Ok(None);
            }
            Err(e) => return Err(e.into()),
        };

        let guild = http.get_guild(guild_id).await?;
        let has_manage_guild = guild.owner_id == user_id
            || member.roles.iter().any(|role_id| {
                guild.roles.get(role_id).is_some_and(|role| {
                    role.permissions.contains(Permissions::ADMINISTRATOR)
                        || role.permissions.contains(Permissions::MANAGE_GUILD)
                })
            });

        Ok(Some(MemberProfile {
            user_id: user_id.to_string(),
            role_ids: member.roles.iter().map(ToString::to_string).collect(),
            has_manage_guild,
        }))
    }
}

#[async_trait]
impl MemberActions for DiscordApi {
    async fn grant_roles(
        &self,
        guild_id: &str,
        user_id: &str,
        role_ids: &[String],
    ) -> Result<()> {
        let http = self.http.get().await?;
        let guild_id = GuildId::new(parse_snowflake("guild id", guild_id)?);
        let user_id = UserId::new(parse_snowflake("user id", user_id)?);
        for role_id in role_ids {
            let role_id = RoleId::new(parse_snowflake("role id", role_id)?);
            http.add_member_role(guild_id, user_id, role_id, Some("role request approved"))
                .await?;
        }
        Ok(())
    }

    async fn set_nickname(&self, guild_id: &str, user_id: &str, nickname: &str) -> Result<()> {
        let http = self.http.get().await?;
        let guild_id = GuildId::new(parse_snowflake("guild id", guild_id)?);
        let user_id = UserId::new(parse_snowflake("user id", user_id)?);
        guild_id
            .edit_member(&http, user_id, EditMember::new().nickname(nickname))
            .await?;
        Ok(())
    }
}

#[async_trait]
impl ReviewSurface for DiscordApi {
    async fn post_review_card(
        &self,
        request: &crate::db::RoleRequest,
        config: &crate::db::GuildConfig,
    ) -> Result<CardLocation> {
        let http = self.http.get().await?;
        let channel_id = config
            .review_channel_id(request.flavor)
            .ok_or_else(|| anyhow!("review channel not configured"))?;
        let channel = ChannelId::new(parse_snowflake("channel id", channel_id)?);

        let buttons = CreateActionRow::Buttons(vec![
            CreateButton::new(render::approve_custom_id(request))
                .label("Approve")
                .style(ButtonStyle::Success),
            CreateButton::new(render::deny_custom_id(request))
                .label("Deny")
                .style(ButtonStyle::Danger),
        ]);
        let message = channel
            .send_message(
                &http,
                CreateMessage::new()
                    .content(render::review_card_text(request))
                    .components(vec![buttons]),
            )
            .await?;

        Ok(CardLocation {
            channel_id: channel.to_string(),
            message_id: message.id.to_string(),
        })
    }

    async fn mark_card_decided(&self, request: &crate::db::RoleRequest) -> Result<()> {
        let (Some(channel_id), Some(message_id)) = (
            request.review_channel_id.as_deref(),
            request.review_message_id.as_deref(),
        ) else {
            return Ok(());
        };
        let http = self.http.get().await?;
        let channel = ChannelId::new(parse_snowflake("channel id", channel_id)?);
        let message = MessageId::new(parse_snowflake("message id", message_id)?);
        channel
            .edit_message(
                &http,
                message,
                EditMessage::new()
                    .content(render::decided_card_text(request))
                    .components(Vec::new()),
            )
            .await?;
        Ok(())
    }

    async fn post_decision_log(
        &self,
        result: &DecisionResult,
        config: &crate::db::GuildConfig,
    ) -> Result<()> {
        let Some(channel_id) = config.log_channel_id(result.request.flavor) else {
            return Ok(());
        };
        let http = self.http.get().await?;
        let channel = ChannelId::new(parse_snowflake("channel id", channel_id)?);
        channel
            .send_message(
                &http,
                CreateMessage::new().content(render::decision_log_text(result)),
            )
            .await?;
        Ok(())
    }
}

fn engine_error_text(error: &EngineError) -> String {
    match error {
        EngineError::Store(_) => "something went wrong, please try again later".to_string(),
        other => other.to_string(),
    }
}

struct BotHandler {
    ready_sender: Arc<AsyncMutex<Option<oneshot::Sender<()>>>>,
    http: HttpHandle,
    engine: Arc<RequestEngine>,
    sessions: Arc<SessionStore>,
    guild_configs: Arc<dyn GuildConfigStore>,
    api: DiscordApi,
}

impl BotHandler {
    async fn respond_component(
        &self,
        http: &Http,
        interaction: &ComponentInteraction,
        text: &str,
    ) {
        let response = CreateInteractionResponse::Message(
            CreateInteractionResponseMessage::new()
                .content(text)
                .ephemeral(true),
        );
        if let Err(e) = interaction.create_response(http, response).await {
            warn!(error = %e, "failed to respond to component interaction");
        }
    }

    async fn respond_modal(&self, http: &Http, interaction: &ModalInteraction, text: &str) {
        let response = CreateInteractionResponse::Message(
            CreateInteractionResponseMessage::new()
                .content(text)
                .ephemeral(true),
        );
        if let Err(e) = interaction.create_response(http, response).await {
            warn!(error = %e, "failed to respond to modal interaction");
        }
    }

    async fn open_request_modal(
        &self,
        ctx: &SerenityContext,
        interaction: &ComponentInteraction,
        role_id: &str,
    ) {
        let modal = CreateModal::new(format!("fac/request/modal/{role_id}"), "Role request")
            .components(vec![
                CreateActionRow::InputText(
                    CreateInputText::new(InputTextStyle::Short, "Display name", "display_name")
                        .required(true),
                ),
                CreateActionRow::InputText(
                    CreateInputText::new(InputTextStyle::Short, "Game id", "game_id")
                        .required(true),
                ),
                CreateActionRow::InputText(
                    CreateInputText::new(InputTextStyle::Short, "Rank (LIDER or SUB)", "rank")
                        .required(true),
                ),
            ]);
        if let Err(e) = interaction
            .create_response(&ctx.http, CreateInteractionResponse::Modal(modal))
            .await
        {
            warn!(error = %e, "failed to open request modal");
        }
    }

    /// Ephemeral role picker: a 25-option select menu over the eligible
    /// roles, with paging buttons when they do not fit one menu.
    async fn send_role_picker(
        &self,
        ctx: &SerenityContext,
        interaction: &ComponentInteraction,
        flavor: RequestFlavor,
        guild_id: &str,
        requested_page: i64,
    ) {
        let config = match self.guild_configs.get_or_create(guild_id).await {
            Ok(config) => config,
            Err(e) => {
                warn!(error = %e, "failed to load guild config for role picker");
                self.respond_component(
                    &ctx.http,
                    interaction,
                    "something went wrong, please try again later",
                )
                .await;
                return;
            }
        };

        let eligible = config.eligible_role_ids(flavor).to_vec();
        if eligible.is_empty() {
            self.respond_component(
                &ctx.http,
                interaction,
                "no requestable roles are configured yet",
            )
            .await;
            return;
        }

        let page = paginate(&eligible, ROLE_SELECT_PAGE_SIZE, requested_page);

        let role_names: HashMap<String, String> = match parse_snowflake("guild id", guild_id) {
            Ok(id) => match ctx.http.get_guild_roles(GuildId::new(id)).await {
                Ok(roles) => roles
                    .iter()
                    .map(|role| (role.id.to_string(), role.name.clone()))
                    .collect(),
                Err(e) => {
                    warn!(error = %e, "failed to fetch guild roles for picker labels");
                    HashMap::new()
                }
            },
            Err(_) => HashMap::new(),
        };

        let options = page
            .items
            .iter()
            .map(|role_id| {
                let label = role_names
                    .get(role_id)
                    .cloned()
                    .unwrap_or_else(|| role_id.clone());
                CreateSelectMenuOption::new(label, role_id.clone())
            })
            .collect();

        let prefix = render::flavor_tag(flavor);
        let mut rows = vec![CreateActionRow::SelectMenu(
            CreateSelectMenu::new(
                format!("{prefix}/request/select"),
                CreateSelectMenuKind::String { options },
            )
            .placeholder("Pick a role to request"),
        )];
        if page.total_pages > 1 {
            rows.push(CreateActionRow::Buttons(vec![
                CreateButton::new(format!("{prefix}/panel/page/{}", page.current_page - 1))
                    .label("Previous")
                    .style(ButtonStyle::Secondary)
                    .disabled(!page.has_previous()),
                CreateButton::new(format!("{prefix}/panel/page/{}", page.current_page + 1))
                    .label("Next")
                    .style(ButtonStyle::Secondary)
                    .disabled(!page.has_next()),
            ]));
        }

        let response = CreateInteractionResponse::Message(
            CreateInteractionResponseMessage::new()
                .content(format!(
                    "Requestable roles (page {}/{})",
                    page.current_page, page.total_pages
                ))
                .components(rows)
                .ephemeral(true),
        );
        if let Err(e) = interaction.create_response(&ctx.http, response).await {
            warn!(error = %e, "failed to send role picker");
        }
    }

    /// Paged readback of the configured eligible roles for the settings
    /// panel, one short page per message.
    async fn send_settings_list(
        &self,
        ctx: &SerenityContext,
        interaction: &ComponentInteraction,
        flavor: RequestFlavor,
        guild_id: &str,
        requested_page: i64,
    ) {
        let config = match self.guild_configs.get_or_create(guild_id).await {
            Ok(config) => config,
            Err(e) => {
                warn!(error = %e, "failed to load guild config for settings list");
                self.respond_component(
                    &ctx.http,
                    interaction,
                    "something went wrong, please try again later",
                )
                .await;
                return;
            }
        };

        let eligible = config.eligible_role_ids(flavor).to_vec();
        let page = paginate(&eligible, SETTINGS_LIST_PAGE_SIZE, requested_page);

        let mut lines = vec![format!(
            "Requestable roles (page {}/{}, {} total):",
            page.current_page, page.total_pages, page.total_items
        )];
        if page.items.is_empty() {
            lines.push("(none yet)".to_string());
        }
        for role_id in page.items {
            lines.push(format!("- <@&{role_id}>"));
        }

        let prefix = render::flavor_tag(flavor);
        let mut rows = Vec::new();
        if page.total_pages > 1 {
            rows.push(CreateActionRow::Buttons(vec![
                CreateButton::new(format!("{prefix}/settings/list/{}", page.current_page - 1))
                    .label("Previous")
                    .style(ButtonStyle::Secondary)
                    .disabled(!page.has_previous()),
                CreateButton::new(format!("{prefix}/settings/list/{}", page.current_page + 1))
                    .label("Next")
                    .style(ButtonStyle::Secondary)
                    .disabled(!page.has_next()),
            ]));
        }

        let response = CreateInteractionResponse::Message(
            CreateInteractionResponseMessage::new()
                .content(lines.join("\n"))
                .components(rows)
                .ephemeral(true),
        );
        if let Err(e) = interaction.create_response(&ctx.http, response).await {
            warn!(error = %e, "failed to send settings list");
        }
    }

    async fn handle_component(&self, ctx: &SerenityContext, interaction: ComponentInteraction) {
        let custom_id = interaction.data.custom_id.clone();
        let Some(guild_id) = interaction.guild_id else {
            self.respond_component(&ctx.http, &interaction, "this only works inside a server")
                .await;
            return;
        };
        let guild_id = guild_id.to_string();
        let user_id = interaction.user.id.to_string();

        if let Some((_, outcome, request_id)) = render::parse_review_custom_id(&custom_id) {
            let text = match self.engine.decide(request_id, &user_id, outcome).await {
                Ok(result) => render::decision_reply_text(&result),
                Err(e) => engine_error_text(&e),
            };
            self.respond_component(&ctx.http, &interaction, &text).await;
            return;
        }

        for flavor in [RequestFlavor::Full, RequestFlavor::Lite] {
            let prefix = render::flavor_tag(flavor);
            if let Some(page) = custom_id.strip_prefix(&format!("{prefix}/panel/page/")) {
                let requested = page.parse().unwrap_or(1);
                self.send_role_picker(ctx, &interaction, flavor, &guild_id, requested)
                    .await;
                return;
            }
            if let Some(page) = custom_id.strip_prefix(&format!("{prefix}/settings/list/")) {
                let requested = page.parse().unwrap_or(1);
                self.send_settings_list(ctx, &interaction, flavor, &guild_id, requested)
                    .await;
                return;
            }
        }

        if custom_id == "fac/request/select" || custom_id == "faclite/request/select" {
            let ComponentInteractionDataKind::StringSelect { values } = &interaction.data.kind
            else {
                return;
            };
            let Some(role_id) = values.first() else {
                return;
            };
            if custom_id.starts_with("faclite/") {
                let text = match self
                    .engine
                    .create_request(RequestFlavor::Lite, &guild_id, &user_id, role_id, None)
                    .await
                {
                    Ok(request) => {
                        format!("Request `{}` submitted for review.", request.request_id)
                    }
                    Err(e) => engine_error_text(&e),
                };
                self.respond_component(&ctx.http, &interaction, &text).await;
            } else {
                self.open_request_modal(ctx, &interaction, role_id).await;
            }
            return;
        }

        if let Some(target) = match custom_id.as_str() {
            "fac/settings/capture-eligible" => Some(CaptureTarget::FullEligible),
            "faclite/settings/capture-eligible" => Some(CaptureTarget::LiteEligible),
            _ => None,
        } {
            let allowed = match self.api.get_member(&guild_id, &user_id).await {
                Ok(Some(profile)) => profile.has_manage_guild,
                _ => false,
            };
            if !allowed {
                self.respond_component(
                    &ctx.http,
                    &interaction,
                    "you need the Manage Server permission for this",
                )
                .await;
                return;
            }
            self.sessions.start(
                &user_id,
                &guild_id,
                &interaction.channel_id.to_string(),
                target,
            );
            self.respond_component(
                &ctx.http,
                &interaction,
                "Type the role ids (or mentions) in this channel, separated by spaces or \
                 commas. Type `cancel` to stop. The session expires in 3 minutes.",
            )
            .await;
        }
    }

    async fn handle_modal(&self, ctx: &SerenityContext, interaction: ModalInteraction) {
        let custom_id = interaction.data.custom_id.clone();
        let Some(role_id) = custom_id.strip_prefix("fac/request/modal/") else {
            return;
        };
        let Some(guild_id) = interaction.guild_id else {
            self.respond_modal(&ctx.http, &interaction, "this only works inside a server")
                .await;
            return;
        };

        let mut values: HashMap<String, String> = HashMap::new();
        for row in &interaction.data.components {
            for component in &row.components {
                if let ActionRowComponent::InputText(input) = component {
                    if let Some(value) = &input.value {
                        values.insert(input.custom_id.clone(), value.clone());
                    }
                }
            }
        }

        let form = FormInput {
            display_name: values.remove("display_name").unwrap_or_default(),
            game_id: values.remove("game_id").unwrap_or_default(),
            rank: values.remove("rank").unwrap_or_default(),
        };

        let text = match self
            .engine
            .create_request(
                RequestFlavor::Full,
                &guild_id.to_string(),
                &interaction.user.id.to_string(),
                role_id,
                Some(form),
            )
            .await
        {
            Ok(request) => format!("Request `{}` submitted for review.", request.request_id),
            Err(e) => engine_error_text(&e),
        };
        self.respond_modal(&ctx.http, &interaction, &text).await;
    }

    async fn handle_capture_message(&self, ctx: &SerenityContext, msg: &SerenityMessage) {
        let Some(guild_id) = msg.guild_id else {
            return;
        };
        let author_id = msg.author.id.to_string();

        // Cheap pre-check before any HTTP round trips.
        if self.sessions.get(&author_id).is_none() {
            return;
        }

        let has_manage_guild = match self
            .api
            .get_member(&guild_id.to_string(), &author_id)
            .await
        {
            Ok(Some(profile)) => profile.has_manage_guild,
            _ => false,
        };

        let guild_roles: HashSet<String> = match ctx.http.get_guild_roles(guild_id).await {
            Ok(roles) => roles.iter().map(|role| role.id.to_string()).collect(),
            Err(e) => {
                warn!(error = %e, "failed to fetch guild roles for capture");
                HashSet::new()
            }
        };

        let capture = CaptureMessage {
            author_id,
            author_is_bot: msg.author.bot,
            guild_id: guild_id.to_string(),
            channel_id: msg.channel_id.to_string(),
            content: msg.content.clone(),
            has_manage_guild,
        };
        let outcome = self
            .sessions
            .process_message(&capture, |id| guild_roles.contains(id));

        let reply = match outcome {
            CaptureOutcome::Ignored => return,
            CaptureOutcome::Cancelled => "Capture cancelled.".to_string(),
            CaptureOutcome::PermissionDenied => {
                "You no longer have the Manage Server permission; capture cancelled.".to_string()
            }
            CaptureOutcome::NoValidIds { invalid } => format!(
                "No role ids found in that message (ignored: {}). Try again or type `cancel`.",
                invalid.join(", ")
            ),
            CaptureOutcome::NoneResolved { not_found, .. } => format!(
                "None of those ids match a role in this server ({}). Try again or type `cancel`.",
                not_found.join(", ")
            ),
            CaptureOutcome::Captured {
                target,
                role_ids,
                invalid,
                not_found,
            } => {
                match self.apply_captured_roles(&capture.guild_id, target, &role_ids).await {
                    Ok(()) => {
                        let mut text = format!("Saved {} role(s).", role_ids.len());
                        if !not_found.is_empty() {
                            text.push_str(&format!(" Not found: {}.", not_found.join(", ")));
                        }
                        if !invalid.is_empty() {
                            text.push_str(&format!(" Ignored: {}.", invalid.join(", ")));
                        }
                        text
                    }
                    Err(e) => {
                        error!(error = %e, "failed to save captured roles");
                        "Something went wrong while saving, please try again.".to_string()
                    }
                }
            }
        };

        if let Err(e) = msg
            .channel_id
            .send_message(&ctx.http, CreateMessage::new().content(reply))
            .await
        {
            warn!(error = %e, "failed to reply to capture message");
        }
    }

    async fn apply_captured_roles(
        &self,
        guild_id: &str,
        target: CaptureTarget,
        role_ids: &[String],
    ) -> Result<()> {
        let mut config = self.guild_configs.get_or_create(guild_id).await?;
        match target {
            CaptureTarget::FullEligible => config.eligible_role_ids = role_ids.to_vec(),
            CaptureTarget::LiteEligible => config.lite_eligible_role_ids = role_ids.to_vec(),
        }
        self.guild_configs.save(&config).await?;
        debug!(
            guild_id = guild_id,
            count = role_ids.len(),
            "captured eligible roles saved"
        );
        Ok(())
    }
}

#[serenity::async_trait]
impl SerenityEventHandler for BotHandler {
    async fn ready(&self, ctx: SerenityContext, ready: Ready) {
        info!(
            "discord gateway ready as {} ({})",
            ready.user.name, ready.user.id
        );
        self.http.set(ctx.http.clone()).await;
        if let Some(sender) = self.ready_sender.lock().await.take() {
            let _ = sender.send(());
        }
    }

    async fn interaction_create(&self, ctx: SerenityContext, interaction: Interaction) {
        match interaction {
            Interaction::Component(component) => self.handle_component(&ctx, component).await,
            Interaction::Modal(modal) => self.handle_modal(&ctx, modal).await,
            _ => {}
        }
    }

    async fn message(&self, ctx: SerenityContext, msg: SerenityMessage) {
        if msg.author.bot {
            return;
        }
        self.handle_capture_message(&ctx, &msg).await;
    }
}

struct DiscordLoginState {
    is_logged_in: bool,
    gateway_task: Option<tokio::task::JoinHandle<()>>,
}

impl Default for DiscordLoginState {
    fn default() -> Self {
        Self {
            is_logged_in: false,
            gateway_task: None,
        }
    }
}

pub struct DiscordClient {
    config: Arc<Config>,
    http: HttpHandle,
    engine: Arc<RequestEngine>,
    sessions: Arc<SessionStore>,
    guild_configs: Arc<dyn GuildConfigStore>,
    login_state: AsyncMutex<DiscordLoginState>,
}

impl DiscordClient {
    pub fn new(
        config: Arc<Config>,
        http: HttpHandle,
        engine: Arc<RequestEngine>,
        sessions: Arc<SessionStore>,
        guild_configs: Arc<dyn GuildConfigStore>,
    ) -> Self {
        Self {
            config,
            http,
            engine,
            sessions,
            guild_configs,
            login_state: AsyncMutex::new(DiscordLoginState::default()),
        }
    }

    pub async fn login(&self) -> Result<()> {
        let mut state = self.login_state.lock().await;
        if state.is_logged_in {
            return Ok(());
        }

        let intents = if self.config.auth.use_privileged_intents {
            GatewayIntents::all()
        } else {
            GatewayIntents::non_privileged()
        };

        let (ready_tx, ready_rx) = oneshot::channel();
        let event_handler = BotHandler {
            ready_sender: Arc::new(AsyncMutex::new(Some(ready_tx))),
            http: self.http.clone(),
            engine: self.engine.clone(),
            sessions: self.sessions.clone(),
            guild_configs: self.guild_configs.clone(),
            api: DiscordApi::new(self.http.clone()),
        };

        let mut gateway_client = SerenityClient::builder(&self.config.auth.bot_token, intents)
            .event_handler(event_handler)
            .await
            .map_err(|err| anyhow!("failed to build discord gateway client: {err}"))?;

        let gateway_task = tokio::spawn(async move {
            if let Err(err) = gateway_client.start_autosharded().await {
                error!("discord gateway stopped: {err}");
            }
        });

        match tokio::time::timeout(std::time::Duration::from_secs(30), ready_rx).await {
            Ok(Ok(())) => {
                state.is_logged_in = true;
                state.gateway_task = Some(gateway_task);
                info!("discord bot login succeeded and gateway is connected");
                Ok(())
            }
            Ok(Err(_)) => {
                gateway_task.abort();
                Err(anyhow!(
                    "discord gateway exited before receiving Ready event"
                ))
            }
            Err(_) => {
                gateway_task.abort();
                Err(anyhow!("timed out waiting for discord Ready event"))
            }
        }
    }

    /// Logs in with exponential backoff, forever, until the gateway is up.
    pub async fn start(&self) -> Result<()> {
        let mut retry_seconds = INITIAL_LOGIN_RETRY_SECONDS;

        loop {
            match self.login().await {
                Ok(()) => {
                    info!("discord client is ready");
                    return Ok(());
                }
                Err(err) => {
                    error!(
                        "failed to start discord client: {err}. retrying in {} seconds",
                        retry_seconds
                    );
                    tokio::time::sleep(std::time::Duration::from_secs(retry_seconds)).await;
                    retry_seconds = (retry_seconds * 2).min(MAX_LOGIN_RETRY_SECONDS);
                }
            }
        }
    }

    pub async fn stop(&self) -> Result<()> {
        let mut state = self.login_state.lock().await;
        if !state.is_logged_in {
            return Ok(());
        }

        if let Some(gateway_task) = state.gateway_task.take() {
            gateway_task.abort();
            match gateway_task.await {
                Ok(()) => info!("discord gateway task exited"),
                Err(join_err) if join_err.is_cancelled() => {
                    info!("discord gateway task aborted")
                }
                Err(join_err) => {
                    error!("discord gateway task join error: {join_err}");
                }
            }
        }

        state.is_logged_in = false;
        info!("discord client stopped");
        Ok(())
    }
}
